//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9@._+-]{0,30}"
    }

    /// Generate a name pacman would reject
    pub fn invalid_package_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[-.][a-z0-9]{0,10}",
            "[a-z]{1,5}[A-Z/ ][a-z]{0,5}",
        ]
    }

    /// Generate a valid proxy URL
    pub fn proxy_url() -> impl Strategy<Value = String> {
        (
            prop_oneof!["http", "https", "socks5", "socks5h"],
            "[a-z]{3,10}",
            1024u16..65535,
        )
            .prop_map(|(scheme, host, port)| format!("{scheme}://{host}.lan:{port}"))
    }

    /// Generate a duration string with its value in seconds
    pub fn duration() -> impl Strategy<Value = (String, u64)> {
        (0u64..5, 0u64..24, 1u64..60).prop_map(|(d, h, m)| {
            let text = if d > 0 {
                format!("{d}d{h}h{m}m")
            } else {
                format!("{h}h{m}m")
            };
            (text, d * 86_400 + h * 3600 + m * 60)
        })
    }

    /// Generate recipe contents
    pub fn recipe() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..512)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::settings::parse_duration;
    use crate::core::target::is_valid_target_name;
    use crate::infra::chroot::proxychains_line;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(is_valid_target_name(&name));
        }

        #[test]
        fn test_invalid_package_names_are_rejected(name in invalid_package_name()) {
            prop_assert!(!is_valid_target_name(&name));
        }

        #[test]
        fn test_duration_parsing(input in duration()) {
            let (text, secs) = input;
            prop_assert_eq!(parse_duration(&text).unwrap().as_secs(), secs);
        }

        #[test]
        fn test_proxychains_line_has_host_and_port(proxy in proxy_url()) {
            let line = proxychains_line(&proxy).unwrap();
            prop_assert_eq!(line.split(' ').count(), 3);
        }
    }
}
