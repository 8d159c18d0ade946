//! Wire-version negotiation helpers.

/// The protocol version this crate speaks and emits on egress.
pub const PROTOCOL_VERSION: &str = "mew/v0.4";

/// Parse a version string of the form `"mew/vMAJOR.MINOR"` into `(MAJOR, MINOR)`.
///
/// Returns `None` if the string does not match the expected format.
#[must_use]
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let rest = version.strip_prefix("mew/v")?;
    let (major_str, minor_str) = rest.split_once('.')?;
    let major = major_str.parse::<u32>().ok()?;
    let minor = minor_str.parse::<u32>().ok()?;
    Some((major, minor))
}

/// Two versions are compatible when they share the same major component.
///
/// For example `"mew/v0.4"` and `"mew/v0.7"` are compatible, but `"mew/v1.0"`
/// and `"mew/v0.4"` are not. Returns `false` if either string cannot be parsed.
#[must_use]
pub fn is_compatible_version(their_version: &str, our_version: &str) -> bool {
    match (parse_version(their_version), parse_version(our_version)) {
        (Some((their_major, _)), Some((our_major, _))) => their_major == our_major,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_minor() {
        assert_eq!(parse_version("mew/v0.4"), Some((0, 4)));
    }

    #[test]
    fn rejects_malformed_version() {
        assert_eq!(parse_version("abp/v0.4"), None);
        assert_eq!(parse_version("mew/v0"), None);
    }

    #[test]
    fn compatible_on_same_major() {
        assert!(is_compatible_version("mew/v0.4", "mew/v0.9"));
        assert!(!is_compatible_version("mew/v1.0", "mew/v0.4"));
    }
}
