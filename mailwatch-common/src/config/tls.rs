//! STARTTLS policy for the SMTP session.

use serde::{Deserialize, Serialize};

/// How the plaintext session is upgraded before authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade via STARTTLS; a server that does not offer it fails the batch.
    ///
    /// This is the default, so credentials never cross the wire in clear
    /// unless explicitly configured.
    #[default]
    Required,

    /// Upgrade via STARTTLS when the server advertises it, otherwise carry on
    /// in plaintext.
    Opportunistic,

    /// Never attempt STARTTLS.
    ///
    /// **WARNING**: Only use against a local relay or for testing.
    Disabled,
}

/// TLS certificate validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Whether to accept invalid TLS certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: Setting this to `true` disables certificate validation
    /// and makes the connection vulnerable to man-in-the-middle attacks.
    ///
    /// Default: `false` (validate certificates)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// Default: `Required`
    #[serde(default)]
    pub policy: TlsPolicy,

    /// Default: `accept_invalid_certs = false`
    #[serde(default)]
    pub certificate: TlsCertificatePolicy,
}

impl TlsConfig {
    /// STARTTLS is mandatory and certificates are validated.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            policy: TlsPolicy::Required,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    /// STARTTLS is used when offered.
    #[must_use]
    pub const fn opportunistic() -> Self {
        Self {
            policy: TlsPolicy::Opportunistic,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    /// Plaintext only.
    ///
    /// **WARNING**: Only use against a local relay or for testing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            policy: TlsPolicy::Disabled,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.policy, TlsPolicy::Required)
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.policy, TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn accept_invalid_certs(&self) -> bool {
        self.certificate.accept_invalid_certs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requires_tls() {
        let config = TlsConfig::default();
        assert!(config.is_required());
        assert!(!config.is_disabled());
        assert!(!config.accept_invalid_certs());
    }

    #[test]
    fn policy_from_ron() {
        let config: TlsConfig =
            ron::from_str("(policy: disabled, certificate: (accept_invalid_certs: true))")
                .unwrap();
        assert_eq!(config.policy, TlsPolicy::Disabled);
        assert!(config.accept_invalid_certs());
    }
}
