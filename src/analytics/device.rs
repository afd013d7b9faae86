//! User-Agent classification
//!
//! Thin wrapper over the woothee classifier. Parsing is pure and total:
//! whatever the header contains (or doesn't), the caller gets a
//! browser / OS / device-class triple with "Unknown" standing in for
//! anything the classifier couldn't place.

use woothee::parser::Parser;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    /// Device class: pc, smartphone, mobilephone, crawler, ...
    pub device: String,
}

impl DeviceInfo {
    pub fn unknown() -> Self {
        Self {
            browser: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            device: UNKNOWN.to_string(),
        }
    }
}

pub struct DeviceParser {
    parser: Parser,
}

impl Default for DeviceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceParser {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    pub fn parse(&self, user_agent: Option<&str>) -> DeviceInfo {
        let Some(user_agent) = user_agent else {
            return DeviceInfo::unknown();
        };

        match self.parser.parse(user_agent) {
            Some(result) => DeviceInfo {
                browser: normalize(result.name),
                os: normalize(result.os),
                device: normalize(result.category),
            },
            None => DeviceInfo::unknown(),
        }
    }
}

// woothee reports unmatched fields as the literal "UNKNOWN"
fn normalize(value: &str) -> String {
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) \
                                 AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 \
                                 Mobile/15E148 Safari/604.1";

    #[test]
    fn parses_desktop_chrome() {
        let parser = DeviceParser::new();
        let info = parser.parse(Some(CHROME_WIN));
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.os, "Windows 10");
        assert_eq!(info.device, "pc");
    }

    #[test]
    fn parses_mobile_safari() {
        let parser = DeviceParser::new();
        let info = parser.parse(Some(SAFARI_IPHONE));
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.device, "smartphone");
    }

    #[test]
    fn missing_header_is_unknown() {
        let parser = DeviceParser::new();
        assert_eq!(parser.parse(None), DeviceInfo::unknown());
    }

    #[test]
    fn garbage_is_unknown_not_an_error() {
        let parser = DeviceParser::new();
        let info = parser.parse(Some("definitely not a user agent"));
        assert_eq!(info.os, UNKNOWN);
    }

    #[test]
    fn empty_string_is_unknown() {
        let parser = DeviceParser::new();
        assert_eq!(parser.parse(Some("")), DeviceInfo::unknown());
    }
}
