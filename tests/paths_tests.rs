use ringr_gate::{
    access::AccessPolicy,
    error::AccessError,
    paths::{ExclusionList, PathClass, PrefixMatch, RequestPath},
};

fn parse(path: &str) -> RequestPath {
    RequestPath::parse(path).unwrap()
}

// --- Normalization ---

#[test]
fn test_normalization_resolves_segments() {
    let cases = [
        ("/", "/"),
        ("/dashboard", "/dashboard"),
        ("/dashboard/", "/dashboard"),
        ("//dashboard//settings", "/dashboard/settings"),
        ("/./dashboard/./team", "/dashboard/team"),
        ("/api/../dashboard", "/dashboard"),
        ("/../../billing", "/billing"),
        ("/%64ashboard", "/dashboard"),
        ("/caf%C3%A9", "/café"),
    ];

    for (raw, normalized) in cases {
        let path = parse(raw);
        assert_eq!(path.as_str(), normalized, "raw {}", raw);
        assert_eq!(path.raw(), raw);
    }
}

#[test]
fn test_malformed_paths_are_rejected() {
    for raw in ["", "dashboard", "/%FF", "/dash%00board", "/a%0Ab"] {
        let result = RequestPath::parse(raw);
        assert!(
            matches!(result, Err(AccessError::MalformedRequestPath(_))),
            "raw {:?}",
            raw
        );
    }
}

#[test]
fn test_decoded_form_keeps_dot_segments() {
    let cases = [
        ("/dashboard/..", "/dashboard/..", "/"),
        ("/billing/%2e%2e/x", "/billing/../x", "/x"),
        ("/%64ashboard/./team", "/dashboard/./team", "/dashboard/team"),
        ("/", "/", "/"),
    ];

    for (raw, decoded, normalized) in cases {
        let path = parse(raw);
        assert_eq!(path.decoded(), decoded, "raw {}", raw);
        assert_eq!(path.as_str(), normalized, "raw {}", raw);
    }
}

#[test]
fn test_encoded_separators_are_rejected() {
    for raw in [
        "/dashboard/..%2Fapi",
        "/dashboard/..%2fapi",
        "/billing/invoices/..%2F..%2Fapi",
        "/dashboard/..%5Capi",
    ] {
        let result = RequestPath::parse(raw);
        assert!(
            matches!(result, Err(AccessError::MalformedRequestPath(_))),
            "raw {:?}",
            raw
        );
    }
}

// --- Prefix Matching ---

#[test]
fn test_segment_prefix_requires_boundary() {
    let m = PrefixMatch::Segment;
    assert!(m.matches("/dashboard", "/dashboard"));
    assert!(m.matches("/dashboard/settings", "/dashboard"));
    assert!(!m.matches("/dashboardish", "/dashboard"));
    assert!(!m.matches("/dash", "/dashboard"));
    // A prefix that already ends in a slash needs no further boundary.
    assert!(m.matches("/docs/intro", "/docs/"));
}

#[test]
fn test_raw_prefix_is_plain_starts_with() {
    let m = PrefixMatch::Raw;
    assert!(m.matches("/dashboard", "/dashboard"));
    assert!(m.matches("/dashboardish", "/dashboard"));
    assert!(!m.matches("/billin", "/billing"));
}

#[test]
fn test_prefix_match_setting_parsing() {
    assert_eq!(PrefixMatch::parse("raw"), PrefixMatch::Raw);
    assert_eq!(PrefixMatch::parse(" RAW "), PrefixMatch::Raw);
    assert_eq!(PrefixMatch::parse("segment"), PrefixMatch::Segment);
    assert_eq!(PrefixMatch::parse("whatever"), PrefixMatch::Segment);
}

// --- Classification ---

#[test]
fn test_default_policy_classification() {
    let policy = AccessPolicy::default();
    let cases = [
        ("/dashboard", PathClass::Protected),
        ("/dashboard/settings", PathClass::Protected),
        ("/onboarding", PathClass::Protected),
        ("/billing/plans", PathClass::Protected),
        ("/login", PathClass::Auth),
        ("/signup", PathClass::Auth),
        ("/", PathClass::Unclassified),
        ("/dashboardish", PathClass::Unclassified),
        ("/pricing", PathClass::Unclassified),
    ];

    for (raw, class) in cases {
        assert_eq!(policy.classify(&parse(raw)), class, "path {}", raw);
    }
}

#[test]
fn test_raw_policy_classifies_lookalikes_as_protected() {
    let policy = AccessPolicy::default().with_prefix_match(PrefixMatch::Raw);
    assert_eq!(policy.classify(&parse("/dashboardish")), PathClass::Protected);
    assert_eq!(policy.classify(&parse("/signups")), PathClass::Auth);
}

// --- Exclusion List ---

#[test]
fn test_default_exclusions_cover_assets_images_and_api() {
    let exclusions = ExclusionList::default();

    for raw in [
        "/_next/static/chunks/main.js",
        "/_next/image",
        "/favicon.ico",
        "/api/access",
        "/logo.svg",
        "/images/hero.webp",
        "/photo.jpeg",
    ] {
        assert!(exclusions.is_excluded(&parse(raw)), "path {}", raw);
    }

    for raw in ["/", "/dashboard", "/login", "/logo.SVG", "/script.js"] {
        assert!(!exclusions.is_excluded(&parse(raw)), "path {}", raw);
    }
}

#[test]
fn test_exclusions_use_normalized_path() {
    let exclusions = ExclusionList::default();
    // Looks like an API call but resolves to the dashboard.
    assert!(!exclusions.is_excluded(&parse("/api/../dashboard")));
}

#[test]
fn test_dot_segments_cannot_reach_the_exclusion_list() {
    let exclusions = ExclusionList::default();
    for raw in ["/dashboard/../api/access", "/billing/%2e%2e/api"] {
        assert!(!exclusions.is_excluded(&parse(raw)), "path {}", raw);
    }
    assert!(exclusions.is_excluded(&parse("/api/./access")));
}

#[test]
fn test_protected_paths_stay_protected_after_normalization() {
    let policy = AccessPolicy::default();
    for raw in ["/dashboard/..", "/billing/%2e%2e/x", "/onboarding/../pricing"] {
        assert_eq!(policy.classify(&parse(raw)), PathClass::Protected, "path {}", raw);
    }
}

#[test]
fn test_exclusions_from_settings() {
    let exclusions = ExclusionList::from_settings(Some(" /static , /healthz,"), None);
    assert_eq!(exclusions.prefixes, vec!["/static", "/healthz"]);
    assert_eq!(exclusions.suffixes, ExclusionList::default().suffixes);
    assert!(exclusions.is_excluded(&parse("/static/app.css")));
    assert!(!exclusions.is_excluded(&parse("/api/access")));

    let no_suffixes = ExclusionList::from_settings(None, Some(""));
    assert!(no_suffixes.suffixes.is_empty());
    assert!(!no_suffixes.is_excluded(&parse("/logo.png")));
}
