//! Hive type classification.
//!
//! The primary signal is the file name the writer embedded in the header.
//! When that name is missing or unrecognised, the on-disk file name and the
//! names of the root key's subkeys are consulted. The content heuristic is
//! best effort: any failure while reading the root falls back to the
//! primary result instead of failing the load.

use crate::utils::names_equal;
use std::fmt;
use std::path::Path;

/// Kind of hive, derived once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HiveType {
    /// Per-user hive (NTUSER.DAT).
    NtUser,
    /// Security Account Manager.
    Sam,
    /// LSA security policy.
    Security,
    /// Machine software configuration.
    Software,
    /// Machine system configuration.
    System,
    /// Per-user classes (UsrClass.dat).
    UsrClass,
    /// Component store (COMPONENTS).
    Components,
    /// Boot configuration data.
    Bcd,
    /// Application compatibility inventory (Amcache.hve).
    Amcache,
    /// Default user profile (DEFAULT).
    Default,
    /// Driver database (DRIVERS).
    Drivers,
    /// Early launch anti-malware (ELAM).
    Elam,
    /// Background broker infrastructure (BBI).
    Bbi,
    /// System cache (Syscache.hve).
    Syscache,
    /// A named hive that is not in the table.
    Other,
    /// Nothing identified the hive.
    Unknown,
}

impl HiveType {
    /// Maps a hive file name (with or without directories) to a type.
    ///
    /// Returns `None` for empty or unrecognised names.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::HiveType;
    /// assert_eq!(HiveType::from_file_name("NTUSER.DAT"), Some(HiveType::NtUser));
    /// assert_eq!(
    ///     HiveType::from_file_name("\\??\\C:\\Windows\\AppCompat\\Programs\\Amcache.hve"),
    ///     Some(HiveType::Amcache)
    /// );
    /// assert_eq!(HiveType::from_file_name("notes.txt"), None);
    /// ```
    pub fn from_file_name(name: &str) -> Option<Self> {
        let base = name
            .rsplit(&['\\', '/'][..])
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        let hive_type = match base.as_str() {
            "ntuser.dat" => HiveType::NtUser,
            "usrclass.dat" => HiveType::UsrClass,
            "sam" => HiveType::Sam,
            "security" => HiveType::Security,
            "software" => HiveType::Software,
            "system" => HiveType::System,
            "components" => HiveType::Components,
            "bcd" | "bcd-template" => HiveType::Bcd,
            "amcache.hve" | "amcache.hve.tmp" => HiveType::Amcache,
            "default" => HiveType::Default,
            "drivers" => HiveType::Drivers,
            "elam" => HiveType::Elam,
            "bbi" => HiveType::Bbi,
            "syscache.hve" => HiveType::Syscache,
            _ => return None,
        };
        Some(hive_type)
    }

    /// Classifies from the name embedded in the hive header.
    ///
    /// Unmapped names yield [`HiveType::Other`], an empty name yields
    /// [`HiveType::Unknown`].
    pub fn from_embedded_name(name: &str) -> Self {
        if name.trim().is_empty() {
            return HiveType::Unknown;
        }
        Self::from_file_name(name).unwrap_or(HiveType::Other)
    }

    /// Guesses the type from the names of the root key's subkeys.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_inspect::HiveType;
    /// let names = ["ControlSet001", "Select", "Setup"];
    /// assert_eq!(HiveType::from_root_subkeys(&names), Some(HiveType::System));
    /// ```
    pub fn from_root_subkeys<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        let has = |wanted: &str| names.iter().any(|n| names_equal(n.as_ref(), wanted));

        // SECURITY roots also carry a SAM subkey
        let hive_type = if has("Policy") {
            HiveType::Security
        } else if has("SAM") {
            HiveType::Sam
        } else if has("ControlSet001") || has("Select") || has("MountedDevices") {
            HiveType::System
        } else if has("DriverDatabase") {
            HiveType::Drivers
        } else if has("CanonicalData") || has("DerivedData") {
            HiveType::Components
        } else if has("Objects") && has("Description") {
            HiveType::Bcd
        } else if has("Root") && names.len() <= 2 {
            HiveType::Amcache
        } else if has("Local Settings") || has("CLSID") {
            HiveType::UsrClass
        } else if has("Control Panel") || has("Environment") {
            HiveType::NtUser
        } else if has("Microsoft") && has("Classes") {
            HiveType::Software
        } else {
            return None;
        };
        Some(hive_type)
    }

    /// Full classification with fallbacks.
    ///
    /// 1. Embedded name (primary).
    /// 2. On-disk file name, if the primary result is `Unknown` or `Other`.
    /// 3. Root subkey names, if still undecided. Errors from `root_subkeys`
    ///    are swallowed and the primary result is kept.
    pub fn detect<F, E>(embedded_name: &str, disk_path: Option<&Path>, root_subkeys: F) -> Self
    where
        F: FnOnce() -> Result<Vec<String>, E>,
    {
        let primary = Self::from_embedded_name(embedded_name);
        if !primary.is_ambiguous() {
            return primary;
        }

        let by_disk_name = disk_path
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name);
        if let Some(hive_type) = by_disk_name {
            return hive_type;
        }

        match root_subkeys() {
            Ok(names) => Self::from_root_subkeys(&names).unwrap_or(primary),
            Err(_) => primary,
        }
    }

    /// Returns true if the fallback classifiers should be consulted.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, HiveType::Unknown | HiveType::Other)
    }

    /// Returns the conventional display name.
    pub fn name(&self) -> &'static str {
        match self {
            HiveType::NtUser => "NTUSER.DAT",
            HiveType::Sam => "SAM",
            HiveType::Security => "SECURITY",
            HiveType::Software => "SOFTWARE",
            HiveType::System => "SYSTEM",
            HiveType::UsrClass => "UsrClass.dat",
            HiveType::Components => "COMPONENTS",
            HiveType::Bcd => "BCD",
            HiveType::Amcache => "Amcache.hve",
            HiveType::Default => "DEFAULT",
            HiveType::Drivers => "DRIVERS",
            HiveType::Elam => "ELAM",
            HiveType::Bbi => "BBI",
            HiveType::Syscache => "Syscache.hve",
            HiveType::Other => "Other",
            HiveType::Unknown => "Unknown",
        }
    }

    /// Returns the registry root this hive is normally mounted under.
    pub fn mount_point(&self) -> Option<&'static str> {
        match self {
            HiveType::System => Some("HKLM\\SYSTEM"),
            HiveType::Software => Some("HKLM\\SOFTWARE"),
            HiveType::Sam => Some("HKLM\\SAM"),
            HiveType::Security => Some("HKLM\\SECURITY"),
            HiveType::Components => Some("HKLM\\COMPONENTS"),
            HiveType::Bcd => Some("HKLM\\BCD00000000"),
            HiveType::NtUser => Some("HKCU"),
            HiveType::UsrClass => Some("HKCU\\Software\\Classes"),
            HiveType::Default => Some("HKU\\.DEFAULT"),
            _ => None,
        }
    }
}

impl fmt::Display for HiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_embedded_name_table() {
        assert_eq!(
            HiveType::from_embedded_name("\\??\\C:\\Users\\bob\\ntuser.dat"),
            HiveType::NtUser
        );
        assert_eq!(
            HiveType::from_embedded_name("emRoot\\System32\\Config\\SAM"),
            HiveType::Sam
        );
        assert_eq!(HiveType::from_embedded_name("Amcache.hve.tmp"), HiveType::Amcache);
        assert_eq!(HiveType::from_embedded_name("BCD-Template"), HiveType::Bcd);
        assert_eq!(HiveType::from_embedded_name("custom.hiv"), HiveType::Other);
        assert_eq!(HiveType::from_embedded_name("   "), HiveType::Unknown);
    }

    #[test]
    fn test_classification_is_pure() {
        let name = "SystemRoot\\System32\\Config\\SOFTWARE";
        assert_eq!(
            HiveType::from_embedded_name(name),
            HiveType::from_embedded_name(name)
        );
    }

    #[test]
    fn test_detect_prefers_embedded_name() {
        let path = PathBuf::from("/evidence/SAM");
        let detected = HiveType::detect("SYSTEM", Some(&path), || -> Result<Vec<String>, ()> {
            panic!("root sniffing must not run")
        });
        assert_eq!(detected, HiveType::System);
    }

    #[test]
    fn test_detect_falls_back_to_disk_name() {
        let path = PathBuf::from("/evidence/NTUSER.DAT");
        let detected = HiveType::detect("", Some(&path), || Err::<Vec<String>, _>(()));
        assert_eq!(detected, HiveType::NtUser);
    }

    #[test]
    fn test_detect_falls_back_to_root_subkeys() {
        let detected = HiveType::detect("", None, || {
            Ok::<_, ()>(vec!["SAM".to_string()])
        });
        assert_eq!(detected, HiveType::Sam);
    }

    #[test]
    fn test_detect_sniffing_failure_is_silent() {
        let detected = HiveType::detect("", Some(Path::new("evidence.bin")), || {
            Err::<Vec<String>, _>("corrupt root")
        });
        assert_eq!(detected, HiveType::Unknown);

        let detected = HiveType::detect("odd.hiv", None, || Err::<Vec<String>, _>("corrupt"));
        assert_eq!(detected, HiveType::Other);
    }

    #[test]
    fn test_root_subkey_heuristic() {
        assert_eq!(
            HiveType::from_root_subkeys(&["Policy", "RXACT"]),
            Some(HiveType::Security)
        );
        assert_eq!(
            HiveType::from_root_subkeys(&["AppEvents", "Control Panel", "Software"]),
            Some(HiveType::NtUser)
        );
        assert_eq!(
            HiveType::from_root_subkeys(&["Cache", "Policy", "RXACT", "SAM"]),
            Some(HiveType::Security)
        );
        assert_eq!(
            HiveType::from_root_subkeys(&["SAM"]),
            Some(HiveType::Sam)
        );
        assert_eq!(HiveType::from_root_subkeys(&["Whatever"]), None);
        assert_eq!(HiveType::from_root_subkeys::<&str>(&[]), None);
    }
}
