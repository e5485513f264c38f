use crate::models::{RequestContext, RoutingRules};

/// Select a destination override for this request.
///
/// Device rules win over geo rules; `None` means the link's own destination
/// applies. Pure and lock-free.
pub fn evaluate<'a>(rules: Option<&'a RoutingRules>, context: &RequestContext) -> Option<&'a str> {
    let rules = rules?;

    if let Some(url) = rules
        .device
        .as_ref()
        .and_then(|by_device| by_device.get(context.device_class.as_str()))
    {
        return Some(url.as_str());
    }

    context
        .country_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .and_then(|code| rules.geo.as_ref()?.get(code))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceClass;
    use std::collections::HashMap;

    fn context(device: DeviceClass, country: Option<&str>) -> RequestContext {
        RequestContext {
            client_ip: "198.51.100.4".parse().unwrap(),
            user_agent: String::new(),
            country_code: country.map(str::to_string),
            device_class: device,
            os: "Unknown".to_string(),
            browser: "Unknown".to_string(),
            referrer: None,
            requested_at: 0,
        }
    }

    fn map(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_device_rule_beats_geo_rule() {
        let rules = RoutingRules {
            device: map(&[("mobile", "M")]),
            geo: map(&[("US", "G")]),
        };
        let ctx = context(DeviceClass::Mobile, Some("US"));
        assert_eq!(evaluate(Some(&rules), &ctx), Some("M"));
    }

    #[test]
    fn test_geo_rule_used_when_device_does_not_match() {
        let rules = RoutingRules {
            device: map(&[("mobile", "M")]),
            geo: map(&[("US", "G")]),
        };
        let ctx = context(DeviceClass::Desktop, Some("US"));
        assert_eq!(evaluate(Some(&rules), &ctx), Some("G"));
    }

    #[test]
    fn test_unmatched_country_yields_no_override() {
        let rules = RoutingRules {
            device: None,
            geo: map(&[("US", "G")]),
        };
        let ctx = context(DeviceClass::Desktop, Some("GB"));
        assert_eq!(evaluate(Some(&rules), &ctx), None);
    }

    #[test]
    fn test_absent_rules_or_country() {
        let ctx = context(DeviceClass::Mobile, None);
        assert_eq!(evaluate(None, &ctx), None);

        let rules = RoutingRules {
            device: None,
            geo: map(&[("US", "G")]),
        };
        assert_eq!(evaluate(Some(&rules), &ctx), None);
        assert_eq!(evaluate(Some(&RoutingRules::default()), &ctx), None);
    }

    #[test]
    fn test_country_match_is_exact() {
        let rules = RoutingRules {
            device: None,
            geo: map(&[("US", "G")]),
        };
        let ctx = context(DeviceClass::Desktop, Some("us"));
        assert_eq!(evaluate(Some(&rules), &ctx), None);
    }
}
