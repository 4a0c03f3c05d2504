// tests/related_scenarios.rs
//
// End-to-end ranking over parsed feeds:
// - A/B/C scenario (current = A, max 2 -> [B, C], B > C)
// - empty feed -> Empty outcome
// - unknown current slug -> feed order, truncated
// - self-exclusion across relative/absolute URLs
// - determinism and stability on ties
// - ambient contexts (keywords, page markup)

use related_posts::ingest::parse_feed;
use related_posts::similarity::{ScoringConfig, TagWeighting};
use related_posts::{
    EngineConfig, PageContext, Post, RelatedEngine, RelatedOutcome, RelatedQuery,
};

fn engine() -> RelatedEngine {
    RelatedEngine::new(EngineConfig::default()).expect("default engine")
}

fn load(engine: &RelatedEngine, doc: &str) -> Vec<Post> {
    engine.normalize(parse_feed(doc).expect("valid feed"))
}

fn titles(o: &RelatedOutcome) -> Vec<&str> {
    o.posts().iter().map(|p| p.title.as_str()).collect()
}

const ABC: &str = r#"{"items":[
    {"title":"A","fullUrl":"/blog/a","tags":["Grief"]},
    {"title":"B","fullUrl":"/blog/b","tags":["Grief","Faith"]},
    {"title":"C","fullUrl":"/blog/c","tags":[]}
]}"#;

#[test]
fn scenario_abc_current_a() {
    let eng = engine();
    let posts = load(&eng, ABC);
    let out = eng.related(&posts, &RelatedQuery::for_identity("a").limit(2));

    assert_eq!(titles(&out), vec!["B", "C"]);
    let cands = out.into_candidates();
    assert_eq!(cands[0].score, 2.0);
    assert_eq!(cands[1].score, 0.0);
}

#[test]
fn identity_may_be_a_path_or_full_url() {
    let eng = engine();
    let posts = load(&eng, ABC);
    for id in ["/blog/a/", " a ", "https://www.example.org/blog/a"] {
        let out = eng.related(&posts, &RelatedQuery::for_identity(id).limit(2));
        assert_eq!(titles(&out), vec!["B", "C"], "identity {id:?}");
    }
}

#[test]
fn empty_feed_is_empty_outcome() {
    let eng = engine();
    for doc in [r#"{"items":[]}"#, "[]", r#"{"collection":{"items":[]}}"#, "{}"] {
        let posts = load(&eng, doc);
        let out = eng.related(&posts, &RelatedQuery::for_identity("a"));
        assert_eq!(out, RelatedOutcome::Empty);
    }
}

#[test]
fn only_the_current_post_is_empty_outcome() {
    let eng = engine();
    let posts = load(&eng, r#"[{"title":"A","url":"/blog/a","tags":["Grief"]}]"#);
    assert!(eng.related(&posts, &RelatedQuery::for_identity("a")).is_empty());
}

#[test]
fn unknown_slug_ranks_in_feed_order() {
    let eng = engine();
    let posts = load(&eng, ABC);
    let out = eng.related(&posts, &RelatedQuery::for_identity("missing").limit(2));
    assert_eq!(titles(&out), vec!["A", "B"]);
    assert!(out.into_candidates().iter().all(|c| c.score == 0.0));
}

#[test]
fn self_exclusion_across_relative_and_absolute_urls() {
    let eng = engine();
    let posts = load(
        &eng,
        r#"[
            {"title":"Self","fullUrl":"https://www.example.org/blog/hope/","tags":["Hope"]},
            {"title":"Other","fullUrl":"/blog/other","tags":["Hope"]}
        ]"#,
    );
    let ctx = PageContext::ambient("", "", ["Hope"]).with_page_url("/blog/hope", None);
    let out = eng.related(&posts, &RelatedQuery::for_context(ctx));
    assert_eq!(titles(&out), vec!["Other"]);
}

#[test]
fn self_exclusion_holds_for_every_identity() {
    let eng = engine();
    let doc = r#"[
        {"title":"P0","url":"/blog/p0","tags":["Grief","Hope"]},
        {"title":"P1","url":"/blog/p1","tags":["Hope"]},
        {"title":"P2","url":"/blog/p2","tags":["Grief"]},
        {"title":"P3","url":"/blog/p3","tags":["Faith","Hope","Grief"]},
        {"title":"P4","url":"/blog/p4","tags":[]}
    ]"#;
    let posts = load(&eng, doc);
    for current in &posts {
        let out = eng.related(&posts, &RelatedQuery::for_identity(current.slug.clone()).limit(10));
        assert!(out.posts().iter().all(|p| p.url != current.url));
        assert_eq!(out.posts().len(), posts.len() - 1);
    }
}

#[test]
fn scores_are_deterministic() {
    let eng = engine();
    let posts = load(&eng, ABC);
    let q = RelatedQuery::for_context(PageContext::ambient("Hope in grief", "", ["Grief", "Faith"]));
    let a = eng.related(&posts, &q).into_candidates();
    let b = eng.related(&posts, &q).into_candidates();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.score.to_bits(), y.score.to_bits());
        assert_eq!(x.post.title, y.post.title);
    }
}

#[test]
fn equal_scores_keep_feed_order() {
    let eng = engine();
    let posts = load(
        &eng,
        r#"[
            {"title":"Cur","url":"/blog/cur","tags":["Hope"]},
            {"title":"T1","url":"/blog/t1","tags":["Hope"]},
            {"title":"Z1","url":"/blog/z1"},
            {"title":"T2","url":"/blog/t2","tags":["Hope"]},
            {"title":"Z2","url":"/blog/z2"},
            {"title":"T3","url":"/blog/t3","tags":["Hope"]}
        ]"#,
    );
    let out = eng.related(&posts, &RelatedQuery::for_identity("cur").limit(5));
    assert_eq!(titles(&out), vec!["T1", "T2", "T3", "Z1", "Z2"]);
}

#[test]
fn recency_only_breaks_ties() {
    let mut cfg = EngineConfig::default();
    cfg.scoring = ScoringConfig {
        recency: true,
        ..ScoringConfig::default()
    };
    let eng = RelatedEngine::new(cfg).unwrap();
    let posts = load(
        &eng,
        r#"[
            {"title":"Cur","url":"/blog/cur","tags":["Hope","Grief"]},
            {"title":"OldTwo","url":"/blog/o","tags":["Hope","Grief"],"publishOn":1},
            {"title":"NewOne","url":"/blog/n","tags":["Hope"],"publishOn":1900000000000},
            {"title":"NewerOne","url":"/blog/n2","tags":["Grief"],"publishOn":1950000000000}
        ]"#,
    );
    let out = eng.related(&posts, &RelatedQuery::for_identity("cur"));
    assert_eq!(titles(&out), vec!["OldTwo", "NewerOne", "NewOne"]);
}

#[test]
fn jaccard_weighting_is_configurable() {
    let mut cfg = EngineConfig::default();
    cfg.scoring.weighting = TagWeighting::Jaccard { weight: 1.0 };
    let eng = RelatedEngine::new(cfg).unwrap();
    let posts = load(&eng, ABC);
    let cands = eng
        .related(&posts, &RelatedQuery::for_identity("a").limit(2))
        .into_candidates();
    // {Grief} vs {Grief, Faith}
    assert_eq!(cands[0].post.title, "B");
    assert!((cands[0].score - 0.5).abs() < 1e-12);
}

#[test]
fn ambient_keywords_and_title_tokens_rank() {
    let eng = engine();
    let posts = load(
        &eng,
        r#"[
            {"title":"Finding rest","url":"/blog/rest"},
            {"title":"Hope after loss","url":"/blog/hope-after-loss"},
            {"title":"Parenting teens","url":"/blog/teens","tags":["Family"]}
        ]"#,
    );
    let ctx = PageContext::ambient("Where is hope after loss?", "", ["Family"]);
    let out = eng.related(&posts, &RelatedQuery::for_context(ctx));
    // Tag match (2.0) beats title-token overlap (< 1.0); both beat nothing.
    assert_eq!(titles(&out), vec!["Parenting teens", "Hope after loss", "Finding rest"]);
}

#[test]
fn page_markup_becomes_ambient_context() {
    let eng = engine();
    let posts = load(&eng, ABC);
    let html = r#"<html><head>
        <title>Walking through grief</title>
        <meta name="keywords" content="Faith">
        <link rel="canonical" href="/blog/b">
        </head><body></body></html>"#;
    let ctx = PageContext::from_html(html, eng.site_base());
    let out = eng.related(&posts, &RelatedQuery::for_context(ctx));
    // B is the page itself and is excluded; A and C tie at zero.
    assert_eq!(titles(&out), vec!["A", "C"]);
}
