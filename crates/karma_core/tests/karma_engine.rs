use karma_core::transfer::TransferError;
use karma_core::{
    AdjustOutcome, ChannelMembers, ChannelOverrides, ChannelRegistry, ChannelSettings, Direction,
    KarmaConfig, KarmaCounts, KarmaEngine, KarmaError, MessageContext, RepoError, Reply,
    ResponseCategory, Schema, SUCCESS_REPLY,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const CHANNEL: &str = "#test";
const SELF_RATING_ERROR: &str = "You're not allowed to adjust your own karma.";

fn engine_with(settings: ChannelSettings) -> KarmaEngine {
    let config = KarmaConfig {
        defaults: settings,
        ..KarmaConfig::default()
    };
    KarmaEngine::new(ChannelRegistry::in_memory(), config)
}

fn engine() -> KarmaEngine {
    engine_with(ChannelSettings::default())
}

fn file_engine(data_dir: &Path) -> KarmaEngine {
    KarmaEngine::open(KarmaConfig {
        data_dir: data_dir.to_path_buf(),
        ..KarmaConfig::default()
    })
}

fn say(engine: &KarmaEngine, author: &str, text: &str) -> Vec<Reply> {
    engine
        .handle_message(
            &MessageContext::new(CHANNEL, author, text),
            &ChannelMembers::default(),
        )
        .unwrap()
}

fn message(text: &str) -> Reply {
    Reply::Message(text.to_string())
}

#[test]
fn increment_then_decrement_returns_to_neutral() {
    let engine = engine();

    assert_eq!(
        say(&engine, "bob", "foo++"),
        vec![message("foo's karma has increased to 1 point.")]
    );
    assert_eq!(
        engine.karma(CHANNEL, "foo").unwrap(),
        Some(KarmaCounts {
            added: 1,
            subtracted: 0
        })
    );

    assert_eq!(
        say(&engine, "bob", "foo--"),
        vec![message("foo's karma is back to neutral (0 points).")]
    );
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap(), None);
    assert_eq!(engine.size(CHANNEL).unwrap(), 0);
}

#[test]
fn one_message_can_carry_several_adjustments() {
    let engine = engine();

    let replies = say(&engine, "bob", "rust++ and (free software)++ but not java--");

    assert_eq!(replies.len(), 3);
    assert_eq!(engine.karma(CHANNEL, "rust").unwrap().unwrap().total(), 1);
    assert_eq!(
        engine.karma(CHANNEL, "free").unwrap(),
        None,
        "a token never spans whitespace"
    );
    assert_eq!(engine.karma(CHANNEL, "java").unwrap().unwrap().total(), -1);
}

#[test]
fn parenthesized_things_are_stored_without_parens() {
    let engine = engine();

    say(&engine, "bob", "(rust)++");

    assert_eq!(engine.karma(CHANNEL, "rust").unwrap().unwrap().total(), 1);
    assert_eq!(engine.karma(CHANNEL, "(rust)").unwrap(), None);
}

#[test]
fn self_rating_is_denied_by_default() {
    let engine = engine();

    assert_eq!(
        say(&engine, "Alice", "alice++"),
        vec![Reply::Error(SELF_RATING_ERROR.to_string())]
    );
    assert_eq!(engine.karma(CHANNEL, "alice").unwrap(), None);
}

#[test]
fn self_rating_can_be_enabled_per_channel() {
    let mut channels = HashMap::new();
    channels.insert(
        "#TEST".to_string(),
        ChannelOverrides {
            allow_self_rating: Some(true),
            ..ChannelOverrides::default()
        },
    );
    let engine = KarmaEngine::new(
        ChannelRegistry::in_memory(),
        KarmaConfig {
            channels,
            ..KarmaConfig::default()
        },
    );

    say(&engine, "alice", "alice++");
    assert_eq!(engine.karma(CHANNEL, "alice").unwrap().unwrap().total(), 1);
}

#[test]
fn alias_declarations_fan_out_karma() {
    let engine = engine();

    assert_eq!(
        say(&engine, "bob", "alice is also known as ali"),
        vec![message("alice is also ali, got it!")]
    );
    assert_eq!(
        say(&engine, "bob", "ali++"),
        vec![message("ali (alice)'s karma has increased to 1 point.")]
    );
    assert_eq!(engine.karma(CHANNEL, "alice").unwrap().unwrap().total(), 1);
    assert_eq!(engine.karma(CHANNEL, "ali").unwrap(), None);

    assert_eq!(
        say(&engine, "bob", "alice is no longer known as ali"),
        vec![message("Who?  I've forgotten that alice was ever ali!")]
    );
    say(&engine, "bob", "ali++");
    assert_eq!(engine.karma(CHANNEL, "ali").unwrap().unwrap().total(), 1);
}

#[test]
fn single_target_alias_still_counts_as_self_rating() {
    let engine = engine();
    engine.add_alias(CHANNEL, "alice", "ali").unwrap();

    let outcomes = engine.adjust(CHANNEL, "Alice", "ali", Direction::Up).unwrap();

    assert_eq!(
        outcomes,
        vec![AdjustOutcome::SelfRatingDenied {
            target: "alice".to_string()
        }]
    );
    assert_eq!(engine.karma(CHANNEL, "alice").unwrap(), None);
}

#[test]
fn multi_target_alias_is_exempt_from_self_rating() {
    let engine = engine();
    engine.add_alias(CHANNEL, "alice", "team").unwrap();
    engine.add_alias(CHANNEL, "carol", "team").unwrap();
    engine.add_alias(CHANNEL, "carol", "team").unwrap();

    let outcomes = engine.adjust(CHANNEL, "alice", "team", Direction::Down).unwrap();

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        match outcome {
            AdjustOutcome::Applied(adjustment) => {
                assert_eq!(adjustment.via_alias.as_deref(), Some("team"));
                assert_eq!(adjustment.total, -1);
                assert_eq!(adjustment.category, ResponseCategory::Down);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(engine.karma(CHANNEL, "alice").unwrap().unwrap().total(), -1);
    assert_eq!(engine.karma(CHANNEL, "carol").unwrap().unwrap().total(), -1);
}

#[test]
fn member_nicks_ending_in_dashes_are_not_decrements() {
    let engine = engine();
    let members = ChannelMembers::new(["weird--", "bob"]);

    let replies = engine
        .handle_message(
            &MessageContext::new(CHANNEL, "carol", "hi weird-- and bob--"),
            &members,
        )
        .unwrap();

    assert_eq!(replies.len(), 1);
    assert_eq!(engine.karma(CHANNEL, "weird").unwrap(), None);
    assert_eq!(engine.karma(CHANNEL, "bob").unwrap().unwrap().total(), -1);
}

#[test]
fn addressed_messages_need_a_trailing_karma_token() {
    let engine = engine();

    let ignored = engine
        .handle_message(
            &MessageContext::new(CHANNEL, "bob", "foo++ is great").addressed(),
            &ChannelMembers::default(),
        )
        .unwrap();
    assert!(ignored.is_empty());
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap(), None);

    let applied = engine
        .handle_message(
            &MessageContext::new(CHANNEL, "bob", "great work foo++").addressed(),
            &ChannelMembers::default(),
        )
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap().unwrap().total(), 1);
}

#[test]
fn addressed_messages_do_not_declare_aliases() {
    let engine = engine();

    let replies = engine
        .handle_message(
            &MessageContext::new(CHANNEL, "bob", "alice is also known as ali").addressed(),
            &ChannelMembers::default(),
        )
        .unwrap();

    assert!(replies.is_empty());
    assert!(engine.aliases_of(CHANNEL, "alice").unwrap().is_empty());
}

#[test]
fn unaddressed_karma_can_be_disabled() {
    let engine = engine_with(ChannelSettings {
        allow_unaddressed_karma: false,
        ..ChannelSettings::default()
    });

    assert!(say(&engine, "bob", "foo++").is_empty());
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap(), None);
}

#[test]
fn silent_channels_still_count() {
    let engine = engine_with(ChannelSettings {
        response: false,
        ..ChannelSettings::default()
    });

    assert!(say(&engine, "bob", "foo++").is_empty());
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap().unwrap().total(), 1);
    assert_eq!(
        say(&engine, "alice", "alice++"),
        vec![Reply::Error(SELF_RATING_ERROR.to_string())]
    );
}

#[test]
fn channels_are_isolated() {
    let engine = engine();

    say(&engine, "bob", "foo++");

    assert_eq!(engine.karma("#other", "foo").unwrap(), None);
    assert_eq!(engine.karma("#TEST", "foo").unwrap().unwrap().total(), 1);
}

#[test]
fn most_named_rejects_unknown_kinds() {
    let engine = engine();
    say(&engine, "bob", "foo++ foo++ bar--");

    let err = engine.most_named(CHANNEL, "bogus", 5).unwrap_err();
    assert!(matches!(err, KarmaError::InvalidArgument(_)));

    let increased = engine.most_named(CHANNEL, "inc", 5).unwrap();
    assert_eq!(increased[0].name, "foo");
    assert_eq!(increased[0].value, 2);
}

#[test]
fn karma_reply_covers_single_many_and_ranking() {
    let engine = engine();
    say(&engine, "carol", "foo++ foo++ bar-- baz++");

    assert_eq!(
        engine
            .karma_reply(CHANNEL, "carol", &["foo".to_string()])
            .unwrap(),
        message("Karma for \"foo\" has been increased 2 times and decreased 0 times for a total karma of 2.")
    );
    assert_eq!(
        engine
            .karma_reply(CHANNEL, "carol", &["qux".to_string()])
            .unwrap(),
        message("qux has neutral karma.")
    );
    assert_eq!(
        engine
            .karma_reply(
                CHANNEL,
                "carol",
                &["foo".to_string(), "bar".to_string(), "qux".to_string()]
            )
            .unwrap(),
        message("foo: 2 and bar: -1.  qux has neutral karma.")
    );
    assert_eq!(
        engine.karma_reply(CHANNEL, "baz", &[]).unwrap(),
        message(
            "Highest karma: \"foo\" (2), \"baz\" (1), and \"bar\" (-1).  \
             Lowest karma: \"bar\" (-1), \"baz\" (1), and \"foo\" (2).  \
             You (baz) are ranked 2 out of 3."
        )
    );
}

#[test]
fn empty_channels_report_missing_karma() {
    let engine = engine();

    assert_eq!(
        engine.karma_reply(CHANNEL, "bob", &[]).unwrap(),
        Reply::Error("I have no karma for this channel.".to_string())
    );
    assert_eq!(
        engine
            .most_reply(CHANNEL, karma_core::MostKind::Active)
            .unwrap(),
        Reply::Error("I have no karma for this channel.".to_string())
    );
}

#[test]
fn clear_keeps_the_entity_at_zero() {
    let engine = engine();
    say(&engine, "bob", "foo++");

    assert_eq!(
        engine.clear_reply(CHANNEL, "FOO").unwrap(),
        message(SUCCESS_REPLY)
    );
    assert_eq!(
        engine.karma(CHANNEL, "foo").unwrap(),
        Some(KarmaCounts::default())
    );
}

#[test]
fn showaliases_lists_known_aliases() {
    let engine = engine();
    engine.add_alias(CHANNEL, "alice", "ali").unwrap();
    engine.add_alias(CHANNEL, "alice", "al").unwrap();

    assert_eq!(
        engine.showaliases_reply(CHANNEL, Some("alice")).unwrap(),
        message("alice is known as ali and al.")
    );
    assert_eq!(
        engine.showaliases_reply(CHANNEL, Some("bob")).unwrap(),
        message("bob doesn't have any aliases!")
    );
    assert_eq!(
        engine.showaliases_reply(CHANNEL, None).unwrap(),
        message("Give me *something*!  A nick, a word, anything!")
    );
}

#[test]
fn dump_and_load_move_a_channel_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let engine = file_engine(dir.path());
    say(&engine, "bob", "Foo++ Foo++ bar--");

    assert_eq!(
        engine.dump_reply(CHANNEL, Schema::Karma, "backup.csv").unwrap(),
        message(SUCCESS_REPLY)
    );
    let dumped = std::fs::read_to_string(dir.path().join("backup.csv")).unwrap();
    assert_eq!(dumped, "Foo,2,0\nbar,0,1\n");

    assert_eq!(
        engine.load_reply("#copy", Schema::Karma, "backup.csv").unwrap(),
        message(SUCCESS_REPLY)
    );
    assert_eq!(
        engine.karma("#copy", "foo").unwrap(),
        Some(KarmaCounts {
            added: 2,
            subtracted: 0
        })
    );
    assert_eq!(engine.karma("#copy", "bar").unwrap().unwrap().total(), -1);
}

#[test]
fn alias_tables_round_trip_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let engine = file_engine(dir.path());
    engine.add_alias(CHANNEL, "alice", "ali").unwrap();
    engine.add_alias(CHANNEL, "bob", "bobby").unwrap();

    assert_eq!(
        engine.dump_reply(CHANNEL, Schema::Alias, "aliases.csv").unwrap(),
        message(SUCCESS_REPLY)
    );
    let dumped = std::fs::read_to_string(dir.path().join("aliases.csv")).unwrap();
    assert_eq!(dumped, "alice,ali\nbob,bobby\n");
    assert_eq!(
        engine.load_reply("#copy", Schema::Alias, "aliases.csv").unwrap(),
        message(SUCCESS_REPLY)
    );

    assert_eq!(
        engine.resolve_alias("#copy", "bobby").unwrap(),
        vec!["bob".to_string()]
    );
}

#[test]
fn malformed_load_leaves_existing_data_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let engine = file_engine(dir.path());
    say(&engine, "bob", "keep++");

    let path = dir.path().join("broken.csv");
    std::fs::write(&path, "good,1,0\nbad,1\n").unwrap();

    let err = engine.load_karma(CHANNEL, &path).unwrap_err();
    match err {
        KarmaError::Transfer(TransferError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.karma(CHANNEL, "keep").unwrap().unwrap().total(), 1);
    assert_eq!(engine.karma(CHANNEL, "good").unwrap(), None);
}

#[test]
fn datasets_persist_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = file_engine(dir.path());
        say(&engine, "bob", "foo++");
        assert_eq!(engine.registry().open_count(), 2);
        engine.close().unwrap();
        assert_eq!(engine.registry().open_count(), 0);
    }

    let engine = file_engine(dir.path());
    let karma_file = engine
        .registry()
        .dataset_path(CHANNEL, Schema::Karma)
        .unwrap()
        .unwrap();
    assert!(karma_file.exists());
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap().unwrap().total(), 1);
}

#[test]
fn self_rating_compares_nicks_with_irc_casemapping() {
    let engine = engine();

    assert_eq!(
        say(&engine, "Foo[m]", "foo{m}++"),
        vec![Reply::Error(SELF_RATING_ERROR.to_string())]
    );
    assert_eq!(engine.karma(CHANNEL, "foo{m}").unwrap(), None);
}

#[test]
fn channels_differing_only_in_separators_stay_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let engine = file_engine(dir.path());

    engine.adjust("#a/b", "bob", "foo", Direction::Up).unwrap();

    assert_eq!(engine.karma("#a/b", "foo").unwrap().unwrap().total(), 1);
    assert_eq!(engine.karma("#a_b", "foo").unwrap(), None);
    assert_eq!(engine.karma("#a%2Fb", "foo").unwrap(), None);
}

#[test]
fn concurrent_adjustments_on_one_entity_are_serialized() {
    let engine = Arc::new(engine());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..50 {
                    engine.adjust(CHANNEL, "bob", "foo", Direction::Up).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(
        engine.karma(CHANNEL, "foo").unwrap(),
        Some(KarmaCounts {
            added: 200,
            subtracted: 0
        })
    );
}

#[test]
fn concurrent_ups_and_downs_end_neutral_and_collected() {
    let engine = Arc::new(engine());

    let workers: Vec<_> = [Direction::Up, Direction::Up, Direction::Down, Direction::Down]
        .into_iter()
        .map(|direction| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..50 {
                    engine.adjust(CHANNEL, "bob", "bar", direction).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(engine.karma(CHANNEL, "bar").unwrap(), None);
    assert_eq!(engine.size(CHANNEL).unwrap(), 0);
}

#[test]
fn a_locked_channel_does_not_block_other_channels() {
    let engine = Arc::new(engine());
    say(&engine, "bob", "foo++");

    let handle = engine.registry().connection(CHANNEL, Schema::Karma).unwrap();
    let guard = handle.lock().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let other = Arc::clone(&engine);
    let worker = thread::spawn(move || {
        let applied = other.adjust("#other", "bob", "foo", Direction::Up).is_ok();
        done_tx.send(applied).unwrap();
    });

    let applied = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(applied);
    drop(guard);
    worker.join().unwrap();

    assert_eq!(engine.karma("#other", "foo").unwrap().unwrap().total(), 1);
    assert_eq!(engine.karma(CHANNEL, "foo").unwrap().unwrap().total(), 1);
}

#[test]
fn saturated_counters_reject_adjustment_and_stay_readable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = file_engine(dir.path());
    let path = dir.path().join("huge.csv");
    std::fs::write(&path, "foo,9223372036854775807,0\n").unwrap();
    engine.load_karma(CHANNEL, &path).unwrap();

    let err = engine.adjust(CHANNEL, "bob", "foo", Direction::Up).unwrap_err();
    assert!(matches!(err, KarmaError::Storage(RepoError::InvalidData(_))));

    assert_eq!(
        engine.karma(CHANNEL, "foo").unwrap(),
        Some(KarmaCounts {
            added: i64::MAX,
            subtracted: 0
        })
    );
    assert_eq!(engine.dump_karma(CHANNEL, &dir.path().join("out.csv")).unwrap(), 1);
}
