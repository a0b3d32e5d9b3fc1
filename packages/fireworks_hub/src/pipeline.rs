//! Turning a request into an event.

use crate::asset::AssetResolver;
use crate::error::HubError;
use crate::event::{Event, Request};

/// Build the broadcast event for a request.
///
/// The asset is looked up with the lower-cased attribute; the display text
/// keeps the attribute exactly as sent. A resolver failure produces no event.
pub fn build_event(request: &Request, resolver: &dyn AssetResolver) -> Result<Event, HubError> {
    let asset = resolver.resolve(&request.attribute.to_lowercase())?;
    Ok(Event::new(request.display_text(), Some(asset)))
}

/// Build the idle prompt for a quiet connection.
pub fn build_nudge(resolver: &dyn AssetResolver) -> Result<Event, HubError> {
    resolver.resolve_default().map(Event::nudge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NUDGE_TEXT;
    use crate::test_helpers::StaticResolver;

    #[test]
    fn text_is_sender_colon_attribute() {
        let resolver = StaticResolver::new();
        let event = build_event(&Request::new("Blue", "Ann"), &resolver).unwrap();
        assert_eq!(event.text(), "Ann: Blue");
    }

    #[test]
    fn attribute_is_lower_cased_for_lookup() {
        let resolver = StaticResolver::new();
        let event = build_event(&Request::new("BLUE", "Ann"), &resolver).unwrap();
        assert_eq!(event.asset(), Some("asset:blue"));
    }

    #[test]
    fn unknown_attribute_gets_default_asset() {
        let resolver = StaticResolver::new();
        for attribute in ["neon", "", "blue ", "🎆"] {
            let event = build_event(&Request::new(attribute, "Bo"), &resolver).unwrap();
            assert_eq!(event.asset(), Some(StaticResolver::DEFAULT), "{attribute:?}");
        }
    }

    #[test]
    fn resolver_failure_produces_no_event() {
        let resolver = StaticResolver::failing();
        let err = build_event(&Request::new("blue", "Ann"), &resolver).unwrap_err();
        assert!(matches!(err, HubError::AssetResolution { .. }));
    }

    #[test]
    fn nudge_uses_default_asset() {
        let resolver = StaticResolver::new();
        let nudge = build_nudge(&resolver).unwrap();
        assert_eq!(nudge.text(), NUDGE_TEXT);
        assert_eq!(nudge.asset(), Some(StaticResolver::DEFAULT));
    }
}
