use gait_compose::naming::{
    entity_short_name, matches_entity, normalize_case, short_name, trailing_token,
};
use gait_compose::{ComposerSession, LatestGate, MockServices, ModelChoice, Services};
use proptest::prelude::*;
use std::sync::Arc;

fn segment() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z][A-Za-z0-9_]{0,12}").unwrap()
}

fn words() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(proptest::string::string_regex("[a-zA-Z]{1,8}").unwrap(), 1..6)
}

#[derive(Debug, Clone)]
enum Edit {
    Query(String),
    Suggest(String),
    Model(bool),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        proptest::string::string_regex("[ {}a-z]{0,12}")
            .unwrap()
            .prop_map(Edit::Query),
        segment().prop_map(Edit::Suggest),
        any::<bool>().prop_map(Edit::Model),
    ]
}

proptest! {
    #[test]
    fn short_name_is_last_segment(prefix in proptest::collection::vec(segment(), 0..4), name in segment(), slashes in 0usize..3) {
        let uri = format!("https://schema.example/{}/{}{}", prefix.join("/"), name, "/".repeat(slashes));
        prop_assert_eq!(short_name(&uri), Some(name.as_str()));
        prop_assert_eq!(entity_short_name(&uri), Some(normalize_case(&name)));
    }

    #[test]
    fn normalize_case_is_idempotent(word in "[A-Za-z0-9 ]{0,16}") {
        let once = normalize_case(&word);
        prop_assert_eq!(normalize_case(&once), once);
    }

    #[test]
    fn entity_matching_ignores_case(name in segment()) {
        prop_assert!(matches_entity(&name.to_uppercase(), &name));
        prop_assert!(matches_entity(&name.to_lowercase(), &name));
        let longer = format!("{name}x");
        prop_assert!(!matches_entity(&longer, &name));
    }

    #[test]
    fn trailing_token_is_last_word(words in words(), pad in "[ \t]{0,3}") {
        let raw = format!("{pad}{}{pad}", words.join(" "));
        prop_assert_eq!(trailing_token(&raw), words.last().map(String::as_str));
    }

    #[test]
    fn only_the_latest_ticket_is_admitted(n in 1usize..20) {
        let gate = LatestGate::new();
        let tickets: Vec<_> = (0..n).map(|_| gate.issue()).collect();
        let admitted: Vec<_> = tickets
            .iter()
            .filter_map(|t| gate.admit(*t, || *t))
            .collect();
        prop_assert_eq!(admitted, vec![tickets[n - 1]]);
    }

    #[test]
    fn can_execute_tracks_query_text(edits in proptest::collection::vec(edit(), 0..24)) {
        let session = ComposerSession::new(
            Services::mock(Arc::new(MockServices::new())),
            ModelChoice::default(),
        );
        let mut rx = session.subscribe();
        for edit in edits {
            match edit {
                Edit::Query(text) => session.set_query_text(&text).unwrap(),
                Edit::Suggest(text) => session.add_suggestion(&text).unwrap(),
                Edit::Model(custom) => session
                    .select_model(if custom { ModelChoice::Custom } else { ModelChoice::OpenAi })
                    .unwrap(),
            }
            let seen = rx.borrow_and_update();
            prop_assert_eq!(seen.can_execute(), !seen.generated_query_text.is_empty());
        }
    }
}
