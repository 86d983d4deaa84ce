use super::*;
use russh::keys::Algorithm;
use russh::{cipher, kex, mac};
use std::fmt;

/// SSH algorithm profile for the transport carrying NETCONF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Modern algorithms only.
    Secure,
    /// Adds SHA-1 MACs, CBC ciphers and plain `ssh-rsa` host keys.
    Balanced,
    /// Adds SHA-1 key exchange and DSA for old IOS-XE trains.
    LegacyCompatible,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Secure => "secure",
            SecurityLevel::Balanced => "balanced",
            SecurityLevel::LegacyCompatible => "legacy",
        }
    }

    fn algorithms(self) -> AlgorithmSet {
        match self {
            SecurityLevel::Secure => AlgorithmSet {
                kex: config::SECURE_KEX_ORDER,
                key: config::SECURE_KEY_TYPES,
                cipher: config::SECURE_CIPHERS,
                mac: config::SECURE_MAC_ALGORITHMS,
            },
            SecurityLevel::Balanced => AlgorithmSet {
                kex: config::BALANCED_KEX_ORDER,
                key: config::BALANCED_KEY_TYPES,
                cipher: config::BALANCED_CIPHERS,
                mac: config::BALANCED_MAC_ALGORITHMS,
            },
            SecurityLevel::LegacyCompatible => AlgorithmSet {
                kex: config::LEGACY_KEX_ORDER,
                key: config::LEGACY_KEY_TYPES,
                cipher: config::LEGACY_CIPHERS,
                mac: config::LEGACY_MAC_ALGORITHMS,
            },
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithms offered for one level, most preferred first.
struct AlgorithmSet {
    kex: &'static [kex::Name],
    key: &'static [Algorithm],
    cipher: &'static [cipher::Name],
    mac: &'static [mac::Name],
}

/// Transport security for one controller connection.
///
/// Part of the session cache key: a cached session is only reused when
/// these options are equal to the requested ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::secure_default()
    }
}

impl ConnectionSecurityOptions {
    /// Options for `level`, with or without the known_hosts check.
    ///
    /// Controllers are usually reached by address with self-signed keys,
    /// so callers decide explicitly whether to verify.
    pub fn for_level(level: SecurityLevel, verify_host_key: bool) -> Self {
        Self {
            level,
            server_check: if verify_host_key {
                ServerCheckMethod::DefaultKnownHostsFile
            } else {
                ServerCheckMethod::NoCheck
            },
        }
    }

    pub fn secure_default() -> Self {
        Self::for_level(SecurityLevel::Secure, true)
    }

    pub fn balanced() -> Self {
        Self::for_level(SecurityLevel::Balanced, true)
    }

    /// Old controller images rarely have a host key worth pinning.
    pub fn legacy_compatible() -> Self {
        Self::for_level(SecurityLevel::LegacyCompatible, false)
    }

    pub fn verifies_host_key(&self) -> bool {
        !matches!(self.server_check, ServerCheckMethod::NoCheck)
    }

    pub(super) fn preferred(&self) -> Preferred {
        let algorithms = self.level.algorithms();
        Preferred {
            kex: Cow::Borrowed(algorithms.kex),
            key: Cow::Borrowed(algorithms.key),
            cipher: Cow::Borrowed(algorithms.cipher),
            mac: Cow::Borrowed(algorithms.mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionSecurityOptions, SecurityLevel};
    use async_ssh2_tokio::ServerCheckMethod;
    use russh::keys::Algorithm;
    use russh::{cipher, kex, mac};

    const ALL_LEVELS: [SecurityLevel; 3] = [
        SecurityLevel::Secure,
        SecurityLevel::Balanced,
        SecurityLevel::LegacyCompatible,
    ];

    #[test]
    fn default_security_options_are_secure() {
        let options = ConnectionSecurityOptions::default();
        assert_eq!(options.level, SecurityLevel::Secure);
        assert!(options.verifies_host_key());
        assert!(matches!(
            options.server_check,
            ServerCheckMethod::DefaultKnownHostsFile
        ));
    }

    #[test]
    fn host_key_check_follows_verify_flag() {
        let options = ConnectionSecurityOptions::for_level(SecurityLevel::Balanced, false);
        assert_eq!(options.level, SecurityLevel::Balanced);
        assert!(!options.verifies_host_key());

        let verified = ConnectionSecurityOptions::for_level(SecurityLevel::Balanced, true);
        assert_eq!(verified, ConnectionSecurityOptions::balanced());
        assert!(!ConnectionSecurityOptions::legacy_compatible().verifies_host_key());
    }

    #[test]
    fn legacy_profile_never_offers_null_algorithms() {
        for level in ALL_LEVELS {
            let preferred = ConnectionSecurityOptions::for_level(level, true).preferred();

            assert!(!preferred.kex.contains(&kex::NONE), "{level}: kex none");
            assert!(!preferred.cipher.contains(&cipher::NONE), "{level}: cipher none");
            assert!(!preferred.cipher.contains(&cipher::CLEAR), "{level}: cipher clear");
            assert!(!preferred.mac.contains(&mac::NONE), "{level}: mac none");
        }
    }

    #[test]
    fn every_profile_prefers_modern_algorithms_first() {
        for level in ALL_LEVELS {
            let preferred = ConnectionSecurityOptions::for_level(level, true).preferred();

            assert_eq!(preferred.kex.first(), Some(&kex::CURVE25519), "{level}");
            assert_eq!(preferred.key.first(), Some(&Algorithm::Ed25519), "{level}");
            assert_eq!(
                preferred.cipher.first(),
                Some(&cipher::CHACHA20_POLY1305),
                "{level}"
            );
            assert_eq!(preferred.mac.first(), Some(&mac::HMAC_SHA512_ETM), "{level}");
        }
    }

    #[test]
    fn secure_profile_excludes_sha1_and_cbc() {
        let preferred = ConnectionSecurityOptions::secure_default().preferred();

        assert!(!preferred.kex.contains(&kex::DH_G1_SHA1));
        assert!(!preferred.kex.contains(&kex::DH_G14_SHA1));
        assert!(!preferred.cipher.contains(&cipher::AES_128_CBC));
        assert!(!preferred.mac.contains(&mac::HMAC_SHA1));
        assert!(!preferred.key.contains(&Algorithm::Rsa { hash: None }));
    }

    #[test]
    fn legacy_profile_still_reaches_old_images() {
        let preferred = ConnectionSecurityOptions::legacy_compatible().preferred();

        assert!(preferred.kex.contains(&kex::DH_G1_SHA1));
        assert!(preferred.cipher.contains(&cipher::AES_128_CBC));
        assert!(preferred.mac.contains(&mac::HMAC_SHA1));
        assert!(preferred.key.contains(&Algorithm::Dsa));
    }

    #[test]
    fn level_names_match_cli_values() {
        let names = ALL_LEVELS.map(|level| level.to_string());
        assert_eq!(names, ["secure", "balanced", "legacy"]);
    }
}
