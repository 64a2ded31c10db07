//! Known remote-access and screen-sharing tools.

use std::collections::BTreeSet;

/// One known tool. `pattern` is matched case-insensitively as a substring of
/// each process identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub pattern: String,
    pub display_name: String,
}

impl Signature {
    pub fn new(pattern: &str, display_name: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            display_name: display_name.to_string(),
        }
    }

    /// Android package ids can also be looked up as installed packages.
    pub fn is_package_id(&self) -> bool {
        self.pattern.contains('.')
    }

    fn matches(&self, lowered_identifier: &str) -> bool {
        lowered_identifier.contains(&self.pattern)
    }
}

const BUILTIN: &[(&str, &str)] = &[
    ("com.anydesk.anydeskandroid", "AnyDesk"),
    ("com.anydesk.adcontrol", "AnyDesk"),
    ("com.teamviewer.teamviewer", "TeamViewer"),
    ("com.teamviewer.quicksupport", "TeamViewer QuickSupport"),
    ("com.teamviewer.host", "TeamViewer Host"),
    ("com.sand.airdroid", "AirDroid"),
    ("com.carriez.flutter_hbb", "RustDesk"),
    ("com.google.chromeremotedesktop", "Chrome Remote Desktop"),
    ("com.splashtop.remote", "Splashtop"),
    ("com.splashtop.sos", "Splashtop SOS"),
    ("com.zoho.assist", "Zoho Assist"),
    ("com.microsoft.rdc.androidx", "Microsoft Remote Desktop"),
    ("com.oray.awesun", "AweSun"),
    ("com.realvnc.viewer.android", "RealVNC"),
    ("com.rsupport.mvagent", "Mobizen"),
    ("com.logmein.rescue", "LogMeIn Rescue"),
    ("anydesk", "AnyDesk"),
    ("teamviewer", "TeamViewer"),
    ("rustdesk", "RustDesk"),
    ("remoting_host", "Chrome Remote Desktop"),
];

pub fn builtin_signatures() -> Vec<Signature> {
    BUILTIN
        .iter()
        .map(|(pattern, name)| Signature::new(pattern, name))
        .collect()
}

/// Display names of every signature found among `identifiers`.
///
/// An identifier claimed by a package signature is reported under that
/// package's name only; the bare product patterns apply to identifiers no
/// package signature matched.
pub fn match_processes(signatures: &[Signature], identifiers: &[String]) -> BTreeSet<String> {
    let (packages, generic): (Vec<&Signature>, Vec<&Signature>) =
        signatures.iter().partition(|sig| sig.is_package_id());

    let mut found = BTreeSet::new();
    for identifier in identifiers {
        let lowered = identifier.to_lowercase();
        let claimed: Vec<&Signature> = packages
            .iter()
            .copied()
            .filter(|sig| sig.matches(&lowered))
            .collect();
        let hits = if claimed.is_empty() {
            generic
                .iter()
                .copied()
                .filter(|sig| sig.matches(&lowered))
                .collect()
        } else {
            claimed
        };
        found.extend(hits.into_iter().map(|sig| sig.display_name.clone()));
    }
    found
}
