//! UMF Module Tests
//!
//! ## Test Scopes
//! - **Envelope merge**: Defaults, long/short precedence, caller overrides.
//! - **Short form**: Alias projection and lossless expansion back to long form.
//! - **Signing & validation**: HMAC signatures and required-field checks.
//! - **Route parsing**: Every branch of the addressing grammar, including the error paths.

#[cfg(test)]
mod tests {
    use crate::umf::message::{create_short_message_id, short_alias};
    use crate::umf::{
        parse_route, ParsedRoute, RouteError, ShortUmf, SignatureAlgorithm, Umf, FIELD_ALIASES,
        UMF_VERSION,
    };
    use serde_json::json;

    fn full_message() -> serde_json::Value {
        json!({
            "to": "serviceA:[post]/v1/jobs",
            "from": "client:/",
            "headers": {"trace": "abc"},
            "mid": "m-1",
            "rmid": "m-0",
            "timeout": 1500,
            "timestamp": "2024-01-01T00:00:00.000Z",
            "type": "job",
            "version": "UMF/1.4.6",
            "via": "gateway",
            "forward": "serviceB:/",
            "body": {"id": 42},
            "authorization": "Bearer token"
        })
    }

    // ============================================================
    // ENVELOPE MERGE TESTS
    // ============================================================

    #[test]
    fn test_create_fills_defaults() {
        let umf = Umf::create(&json!({"to": "svc:/x"}));

        assert_eq!(umf.to, "svc:/x");
        assert!(!umf.mid.is_empty(), "mid must always be generated");
        assert!(umf.timestamp.ends_with('Z'), "timestamp should be ISO 8601 UTC");
        assert_eq!(umf.version, UMF_VERSION);
        assert!(umf.from.is_none());
        assert!(umf.body.is_none());
    }

    #[test]
    fn test_create_generates_unique_mids() {
        let a = Umf::create(&json!({}));
        let b = Umf::create(&json!({}));

        assert_ne!(a.mid, b.mid);
    }

    #[test]
    fn test_create_caller_values_override_defaults() {
        let umf = Umf::create(&json!({
            "mid": "fixed",
            "timestamp": "2020-02-02T00:00:00.000Z",
            "version": "UMF/1.0"
        }));

        assert_eq!(umf.mid, "fixed");
        assert_eq!(umf.timestamp, "2020-02-02T00:00:00.000Z");
        assert_eq!(umf.version, "UMF/1.0");
    }

    #[test]
    fn test_create_accepts_short_aliases() {
        let umf = Umf::create(&json!({
            "to": "svc:/x",
            "frm": "client:/",
            "hdr": {"a": 1},
            "tmo": 30,
            "ts": "2021-01-01T00:00:00.000Z",
            "typ": "ping",
            "ver": "UMF/1.4.6",
            "fwd": "other:/",
            "bdy": {"k": "v"},
            "aut": "secret",
            "sig": "deadbeef"
        }));

        assert_eq!(umf.from.as_deref(), Some("client:/"));
        assert_eq!(umf.headers.as_ref().map(|h| h["a"].clone()), Some(json!(1)));
        assert_eq!(umf.timeout, Some(json!(30)));
        assert_eq!(umf.timestamp, "2021-01-01T00:00:00.000Z");
        assert_eq!(umf.kind.as_deref(), Some("ping"));
        assert_eq!(umf.forward.as_deref(), Some("other:/"));
        assert_eq!(umf.body, Some(json!({"k": "v"})));
        assert_eq!(umf.authorization.as_deref(), Some("secret"));
        assert_eq!(umf.signature.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_create_carries_loose_values_through() {
        let umf = Umf::create(&json!({
            "to": "svc:/x",
            "headers": ["not", "an", "object"],
            "timeout": 1.5,
            "tmo": 99
        }));
        let stringly = Umf::create(&json!({"to": "svc:/x", "timeout": "30"}));

        assert_eq!(umf.headers, Some(json!(["not", "an", "object"])));
        assert_eq!(umf.timeout, Some(json!(1.5)));
        assert_eq!(stringly.timeout, Some(json!("30")));

        let wire = serde_json::to_value(stringly.to_short()).unwrap();
        assert_eq!(wire["tmo"], "30");
    }

    #[test]
    fn test_create_long_name_wins_over_alias() {
        let umf = Umf::create(&json!({"from": "long", "frm": "short", "bdy": 1, "body": 2}));

        assert_eq!(umf.from.as_deref(), Some("long"));
        assert_eq!(umf.body, Some(json!(2)));
    }

    #[test]
    fn test_create_falls_back_to_alias_when_long_is_falsy() {
        let umf = Umf::create(&json!({"from": "", "frm": "short"}));

        assert_eq!(umf.from.as_deref(), Some("short"));
    }

    #[test]
    fn test_create_from_non_object_yields_empty_envelope() {
        let umf = Umf::create(&json!("not an object"));

        assert_eq!(umf.to, "");
        assert!(!umf.mid.is_empty());
        assert!(!umf.validate());
    }

    #[test]
    fn test_parse_decodes_short_wire_payload() {
        let raw = r#"{"to":"svc:/x","mid":"abc","frm":"me:/","bdy":{"n":1}}"#;

        let umf = Umf::parse(raw).expect("valid json");

        assert_eq!(umf.mid, "abc");
        assert_eq!(umf.from.as_deref(), Some("me:/"));
        assert!(umf.validate());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Umf::parse("{not json").is_err());
    }

    // ============================================================
    // SHORT FORM TESTS
    // ============================================================

    #[test]
    fn test_alias_table_covers_every_field() {
        assert_eq!(FIELD_ALIASES.len(), 14);
        assert_eq!(short_alias("from"), Some("frm"));
        assert_eq!(short_alias("authorization"), Some("aut"));
        assert_eq!(short_alias("unknown"), None);
    }

    #[test]
    fn test_to_short_uses_aliases() {
        let umf = Umf::create(&full_message());

        let wire = serde_json::to_value(umf.to_short()).unwrap();

        assert_eq!(wire["to"], "serviceA:[post]/v1/jobs");
        assert_eq!(wire["frm"], "client:/");
        assert_eq!(wire["hdr"], json!({"trace": "abc"}));
        assert_eq!(wire["mid"], "m-1");
        assert_eq!(wire["rmid"], "m-0");
        assert_eq!(wire["tmo"], 1500);
        assert_eq!(wire["ts"], "2024-01-01T00:00:00.000Z");
        assert_eq!(wire["typ"], "job");
        assert_eq!(wire["ver"], "UMF/1.4.6");
        assert_eq!(wire["via"], "gateway");
        assert_eq!(wire["fwd"], "serviceB:/");
        assert_eq!(wire["bdy"], json!({"id": 42}));
        assert_eq!(wire["aut"], "Bearer token");
        assert!(wire.get("from").is_none(), "long names must not leak onto the wire");
    }

    #[test]
    fn test_to_short_omits_absent_fields_but_keeps_to_and_mid() {
        let umf = Umf::create(&json!({}));

        let wire = serde_json::to_value(umf.to_short()).unwrap();
        let object = wire.as_object().unwrap();

        assert_eq!(object["to"], "");
        assert!(object.contains_key("mid"));
        for absent in ["frm", "hdr", "rmid", "sig", "tmo", "typ", "via", "fwd", "bdy", "aut"] {
            assert!(!object.contains_key(absent), "{} should be omitted", absent);
        }
    }

    #[test]
    fn test_short_form_expands_back_to_original_values() {
        let original = Umf::create(&full_message());

        let short = original.to_short();
        let from_struct = Umf::from(short.clone());
        let from_wire = Umf::parse(&serde_json::to_string(&short).unwrap()).unwrap();

        assert_eq!(from_struct, original);
        assert_eq!(from_wire, original);
    }

    #[test]
    fn test_short_umf_deserializes_with_missing_fields() {
        let short: ShortUmf = serde_json::from_str(r#"{"to":"svc:/"}"#).unwrap();

        assert_eq!(short.to, "svc:/");
        assert!(short.bdy.is_none());
    }

    #[test]
    fn test_short_message_id_is_base36() {
        let id = create_short_message_id();

        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    // ============================================================
    // SIGNING & VALIDATION TESTS
    // ============================================================

    #[test]
    fn test_sign_produces_hex_digest() {
        let mut umf = Umf::create(&full_message());

        umf.sign(SignatureAlgorithm::Sha256, b"secret").unwrap();

        let signature = umf.signature.clone().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(umf.verify(SignatureAlgorithm::Sha256, b"secret"));
        assert!(!umf.verify(SignatureAlgorithm::Sha256, b"other"));
    }

    #[test]
    fn test_sign_replaces_existing_signature() {
        let mut a = Umf::create(&full_message());
        let mut b = a.clone();
        b.signature = Some("stale".to_string());

        a.sign(SignatureAlgorithm::Sha512, b"k").unwrap();
        b.sign(SignatureAlgorithm::Sha512, b"k").unwrap();

        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature.unwrap().len(), 128);
    }

    #[test]
    fn test_signature_covers_body() {
        let mut a = Umf::create(&full_message());
        let mut b = a.clone();
        b.body = Some(json!({"id": 43}));

        a.sign(SignatureAlgorithm::Sha256, b"k").unwrap();
        b.sign(SignatureAlgorithm::Sha256, b"k").unwrap();

        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!("sha256".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha256));
        assert_eq!("SHA384".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha384));
        assert!("md5".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_validate_requires_from_to_and_body() {
        let valid = Umf::create(&json!({"to": "a:/", "from": "b:/", "body": {}}));
        let no_body = Umf::create(&json!({"to": "a:/", "from": "b:/"}));
        let no_from = Umf::create(&json!({"to": "a:/", "body": {}}));
        let no_to = Umf::create(&json!({"from": "b:/", "body": {}}));

        assert!(valid.validate());
        assert!(!no_body.validate(), "missing body must be invalid even with to/from set");
        assert!(!no_from.validate());
        assert!(!no_to.validate());
    }

    // ============================================================
    // ROUTE PARSER TESTS
    // ============================================================

    #[test]
    fn test_route_with_http_verb() {
        let route = parse_route("serviceA:[get]/users/1").unwrap();

        assert_eq!(route.service_name, "serviceA");
        assert_eq!(route.http_method.as_deref(), Some("get"));
        assert_eq!(route.api_route, "/users/1");
        assert_eq!(route.instance, "");
        assert_eq!(route.sub_id, "");
    }

    #[test]
    fn test_route_with_instance_and_sub_id() {
        let route = parse_route("123-abc@serviceA:/x").unwrap();

        assert_eq!(route.instance, "123");
        assert_eq!(route.sub_id, "abc");
        assert_eq!(route.service_name, "serviceA");
        assert_eq!(route.api_route, "/x");
        assert!(route.targets_instance());
    }

    #[test]
    fn test_route_with_instance_only() {
        let route = parse_route("deadbeef@svc:/x").unwrap();

        assert_eq!(route.instance, "deadbeef");
        assert_eq!(route.sub_id, "");
    }

    #[test]
    fn test_route_without_verb_leaves_method_unset() {
        let route = parse_route("svc:/plain").unwrap();

        assert_eq!(route.http_method, None);
        assert_eq!(route.api_route, "/plain");
        assert!(!route.targets_instance());
    }

    #[test]
    fn test_route_verb_is_lowercased() {
        let route = parse_route("svc:[DELETE]/items/9").unwrap();

        assert_eq!(route.http_method.as_deref(), Some("delete"));
        assert_eq!(route.api_route, "/items/9");
    }

    #[test]
    fn test_route_empty_verb_keeps_brackets() {
        let route = parse_route("svc:[]/x").unwrap();

        assert_eq!(route.http_method.as_deref(), Some(""));
        assert_eq!(route.api_route, "[]/x");
    }

    #[test]
    fn test_route_rejoins_extra_segments() {
        let route = parse_route("svc:v1:[put]/a").unwrap();

        assert_eq!(route.service_name, "svc");
        assert_eq!(route.api_route, "v1:[put]/a");
        assert_eq!(route.http_method, None);
    }

    #[test]
    fn test_route_keeps_http_scheme_together() {
        let route = parse_route("http://host:[get]/status").unwrap();

        assert_eq!(route.service_name, "http://host");
        assert_eq!(route.http_method.as_deref(), Some("get"));
        assert_eq!(route.api_route, "/status");
    }

    #[test]
    fn test_route_single_segment_is_error() {
        let result = parse_route("onlyoneseg");

        assert_eq!(result, Err(RouteError::InvalidSegmentCount));
        assert_eq!(
            result.unwrap_err().to_string(),
            "route field has invalid number of routable segments"
        );
    }

    #[test]
    fn test_route_unterminated_verb_is_error() {
        let result = parse_route("svc:[badverb/x");

        assert_eq!(result, Err(RouteError::IllFormedVerb));
        assert_eq!(
            result.unwrap_err().to_string(),
            "route field has ill-formed HTTP method verb in segment"
        );
    }

    #[test]
    fn test_route_from_str() {
        let route: ParsedRoute = "svc:/x".parse().unwrap();

        assert_eq!(route.service_name, "svc");
    }
}
