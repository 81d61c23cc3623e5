use crate::{
    calculator::{VoteCalculator, TOTAL},
    config::RfxConfigStore,
    dump_parser::DumpWiki,
    project::Project,
    test_support::prelude::*,
};

const RFA_DAVE: &str = "\
===[[Wikipedia:Requests for adminship/Dave|Dave]]===
'''[[Wikipedia:Requests for adminship/Dave|Voice your opinion on this candidate]]''' (talk page) '''(45/3/2); Scheduled to end 18:00, 14 August 2017 (UTC)'''

Nomination text, co-nominated by [[User:Nominator|Nominator]] ([[User talk:Nominator|talk]]).

=====Discussion=====
* Links for Dave: {{Luser|Dave}}

'''Please keep discussion constructive and civil.'''
----

=====Support=====
# As nominator. [[User:Nominator|Nominator]] ([[User talk:Nominator|talk]]) 18:01, 7 August 2017 (UTC)
# Good contributor. [[User:Alice|Alice]] ([[User talk:Alice|talk]]) 18:30, 7 August 2017 (UTC)
#:Agreed. [[User:Bob]] 18:40, 7 August 2017 (UTC)

=====Oppose=====
# Not enough experience. {{unsigned2|19:00, 7 August 2017|Bob}}
# [[User:Carol/sig|Carol]] 20:00, 7 August 2017 (UTC)

=====Neutral=====
# Leaning support. [[User:Nominator]] 21:00, 7 August 2017 (UTC)
";

const RFA_ERIN: &str = "\
===[[Wikipedia:Requests for adminship/Erin|Erin]]===
Final (10/20/0); ended 12:00, 1 March 2016 (UTC)

====Support====
# [[User:Bob]] 01:00, 24 February 2016 (UTC)

====Oppose====
# [[User:Alice|Alice]] 02:00, 24 February 2016 (UTC)
";

const RFB_FRANK: &str = "\
====Support====
# {{User:Alice/sig}} 03:00, 1 June 2015 (UTC)
";

fn dump_wiki() -> DumpWiki {
    let xml = export(&[
        page_xml(
            4,
            "Wikipedia:Requests for adminship/Dave",
            &[("Nominator", "draft"), ("Alice", "draft 2"), ("Bob", RFA_DAVE)],
        ),
        page_xml(
            4,
            "Wikipedia:Requests for adminship/Erin",
            &[("Bob", "draft"), ("Alice", RFA_ERIN)],
        ),
        page_xml(
            4,
            "Wikipedia:Requests for adminship/Alice",
            &[("Alice", "===Support===\n# [[User:Alice]] self support")],
        ),
        page_xml(
            4,
            "Wikipedia:Requests for adminship/Header",
            &[("Alice", "===Support===\n# [[User:Alice]]")],
        ),
        page_xml(
            4,
            "Wikipedia:Requests for bureaucratship/Frank",
            &[("Alice", RFB_FRANK)],
        ),
    ]);
    DumpWiki::from_reader(xml.as_bytes()).unwrap()
}

#[test]
fn test_vote_report_from_export() {
    let wiki = dump_wiki();
    let project = wiki.project("en.wikipedia.org");
    let store = RfxConfigStore::builtin();
    assert!(store.is_configured(&project));
    let config = store.config_for(&project).unwrap();

    let calculator = VoteCalculator::new(&wiki, &wiki);
    let report = calculator.compute_totals(&project, "Alice", &config).unwrap();

    assert_eq!(report.totals.count("Requests_for_adminship", "support"), 1);
    assert_eq!(report.totals.count("Requests_for_adminship", "oppose"), 1);
    assert_eq!(report.totals.count("Requests_for_adminship", TOTAL), 2);
    assert_eq!(report.totals.count("Requests_for_bureaucratship", "support"), 1);
    assert_eq!(report.totals.count("Requests_for_bureaucratship", TOTAL), 1);
    assert!(!report.is_partial());

    let dave = report
        .pages
        .iter()
        .find(|p| p.candidate == "Dave")
        .unwrap();
    assert_eq!(dave.title, "Wikipedia:Requests for adminship/Dave");
    assert_eq!(dave.section, "support");
    assert_eq!(dave.end_date.as_deref(), Some("18:00, 14 August 2017"));
    assert_eq!(dave.section_counts["support"], 2);
    assert_eq!(dave.section_counts["oppose"], 2);
    assert_eq!(dave.section_counts["neutral"], 1);
    assert_eq!(dave.duplicates, ["nominator"]);

    let erin = report
        .pages
        .iter()
        .find(|p| p.candidate == "Erin")
        .unwrap();
    assert_eq!(erin.section, "oppose");
    assert_eq!(erin.end_date.as_deref(), Some("12:00, 1 March 2016"));
}

#[test]
fn test_reply_does_not_count_as_vote() {
    let wiki = dump_wiki();
    let project = wiki.project("en.wikipedia.org");
    let config = RfxConfigStore::builtin().config_for(&project).unwrap();

    let calculator = VoteCalculator::new(&wiki, &wiki);
    let report = calculator.compute_totals(&project, "Bob", &config).unwrap();

    // Bob replied in Dave's support section but voted in the oppose section
    assert_eq!(report.totals.count("Requests_for_adminship", "oppose"), 1);
    assert_eq!(report.totals.count("Requests_for_adminship", "support"), 1);
    assert_eq!(report.totals.count("Requests_for_adminship", TOTAL), 2);
    assert_eq!(
        report.totals.get("Requests_for_bureaucratship").map(|t| t.len()),
        Some(0)
    );
}

#[test]
fn test_underscored_user_from_command_line() {
    let xml = export(&[page_xml(
        4,
        "Wikipedia:Requests_for_adminship/Grace",
        &[("Foo Bar", "===Neutral===\n# Unsure. [[User:Foo_Bar|Foo]] 10:00, 2 May 2018 (UTC)")],
    )]);
    let wiki = DumpWiki::from_reader(xml.as_bytes()).unwrap();
    let project = wiki.project("en.wikipedia.org");
    let config = RfxConfigStore::builtin().config_for(&project).unwrap();

    let calculator = VoteCalculator::new(&wiki, &wiki);
    for user in ["Foo_Bar", "Foo Bar"] {
        let report = calculator.compute_totals(&project, user, &config).unwrap();
        assert_eq!(report.totals.count("Requests_for_adminship", "neutral"), 1);
        assert_eq!(report.totals.count("Requests_for_adminship", TOTAL), 1);
        assert_eq!(report.pages[0].title, "Wikipedia:Requests for adminship/Grace");
    }
}

#[test]
fn test_unconfigured_project() {
    let wiki = dump_wiki();
    let project = wiki.project("de.wikipedia.org");
    assert!(!RfxConfigStore::builtin().is_configured(&project));
    assert!(RfxConfigStore::builtin().config_for(&project).is_none());
}

#[test]
fn test_custom_store_from_yaml() {
    let yaml = r#"
test.wikipedia.org:
  sections: [support, oppose, neutral]
  date_regexp: 'ends (.*)'
  namespace: 4
  pages: [RfA]
"#;
    let store = RfxConfigStore::from_yaml_str(yaml).unwrap();
    let xml = export(&[page_xml(
        4,
        "Wikipedia:RfA/Dave",
        &[
            ("Alice", "===Support===\n#[[User:Alice]]\n===Oppose===\n#[[User:Bob]]"),
            ("Eve", "===Support===\n#[[User:Alice]]\n===Oppose===\n#[[User:Bob]]"),
        ],
    )]);
    let wiki = DumpWiki::from_reader(xml.as_bytes()).unwrap();
    let project = Project {
        domain: "test.wikipedia.org".into(),
        ..wiki.project("")
    };
    let config = store.config_for(&project).unwrap();
    let calculator = VoteCalculator::new(&wiki, &wiki);

    let alice = calculator.compute_totals(&project, "Alice", &config).unwrap();
    let json = serde_json::to_value(&alice.totals).unwrap();
    assert_eq!(json, serde_json::json!({ "RfA": { "support": 1, "total": 1 } }));

    let eve = calculator.compute_totals(&project, "Eve", &config).unwrap();
    let json = serde_json::to_value(&eve.totals).unwrap();
    assert_eq!(json, serde_json::json!({ "RfA": {} }));
}
