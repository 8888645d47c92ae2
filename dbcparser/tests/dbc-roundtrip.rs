/*
 * Copyright (C) 2015-2023 IoT.bzh Company
 * Author: Fulup Ar Foll <fulup@iot.bzh>
 *
 * Redpesk interface code/config use MIT License and can be freely copy/modified even within proprietary code
 * License: $RP_BEGIN_LICENSE$ SPDX:MIT https://opensource.org/licenses/MIT $RP_END_LICENSE$
 */

//! Load, merge and write back complete databases.

use candb::prelude::*;
use std::fs;
use tempfile::TempDir;

const POWERTRAIN: &str = r#"VERSION "1.2"

NS_ :
    CM_
    BA_DEF_

BS_:

BU_: Engine Dash Gateway

VAL_TABLE_ OnOff 1 "On" 0 "Off" ;

BO_ 100 EngineData: 8 Engine
 SG_ Rpm : 0|16@1+ (0.25,0) [0|16383.75] "rpm" Dash,Gateway
 SG_ Temp : 16|8@1- (1,-40) [-40|215] "degC" Dash
 SG_ Mode M : 24|2@1+ (1,0) [0|3] "" Vector__XXX
 SG_ Torque m1 : 32|16@1+ (0.1,0) [0|6553.5] "Nm" Gateway

BO_ 2364540158 EEC1: 8 Vector__XXX
 SG_ Load : 7|8@0+ (1,0) [0|250] "%" Dash

BO_TX_BU_ 100 : Engine,Gateway;

EV_ Wiper: 0 [0|3] "" 0 1 DUMMY_NODE_VECTOR3 Dash;

CM_ "powertrain bus";
CM_ BU_ Engine "engine controller";
CM_ BO_ 100 "engine frame
spanning lines";
CM_ SG_ 100 Rpm "crank speed";
CM_ EV_ Wiper "wiper stage";
BA_DEF_ BO_  "Mode" ENUM  "Off","On","Standby";
BA_DEF_ SG_  "Quality" FLOAT 0 1.5;
BA_DEF_  "Owner" STRING ;
BA_DEF_DEF_  "Mode" "Off";
BA_DEF_DEF_  "Quality" 1;
BA_DEF_DEF_  "Owner" "";
BA_ "Owner" "team";
BA_ "Mode" BO_ 100 2;
BA_ "GenMsgCycleTime" BO_ 100 10;
BA_ "GenMsgSendType" BO_ 100 0;
BA_ "Quality" SG_ 100 Rpm 0.5;
BA_ "GenSigSendType" SG_ 100 Temp 1;
VAL_ 100 Mode 0 "Idle" 1 "Run" 2 "Stop" ;
VAL_ Wiper 0 "Off" 3 "Fast" ;
SIG_VALTYPE_ 100 Torque : 1;
SIG_GROUP_ 100 Core 1 : Rpm Temp;
SG_MUL_VAL_ 100 Torque Mode 1-1;
"#;

fn parsed(name: &str, text: &str) -> Network {
    let mut network = Network::new();
    let report = network.load_str(name, text).unwrap();
    assert!(report.unparsed.is_empty(), "unparsed lines: {:?}", report.unparsed);
    network
}

#[test]
fn sample_is_fully_understood() {
    let network = parsed("powertrain", POWERTRAIN);
    assert_eq!(network.version, "1.2");
    assert_eq!(network.nodes.len(), 3);
    assert_eq!(network.comment, "powertrain bus");
    assert_eq!(network.attributes.get("Owner").map(String::as_str), Some("team"));

    let engine = network.message(MessageId(100)).unwrap();
    assert_eq!(engine.comment, "engine frame\nspanning lines");
    assert_eq!(engine.transmitters, vec!["Engine".to_owned(), "Gateway".to_owned()]);
    assert_eq!(engine.receivers, vec!["Dash".to_owned(), "Gateway".to_owned()]);
    assert_eq!(engine.attributes.get("Mode"), Some(&AttrValue::Enum("Standby".into())));
    assert_eq!(engine.attributes.get("GenMsgSendType"), Some(&AttrValue::Enum("cyclic".into())));
    assert_eq!(engine.signal_groups[0].signal_names, vec!["Rpm".to_owned(), "Temp".to_owned()]);

    let torque = engine.signal("Torque").unwrap();
    assert_eq!(torque.extended_value_type, SignalExtendedValueType::IEEEfloat32Bit);
    assert_eq!(torque.multiplexer_indicator, MultiplexIndicator::MultiplexedSignal(1));
    let temp = engine.signal("Temp").unwrap();
    assert_eq!(temp.attributes.get("GenSigSendType"), Some(&AttrValue::Enum("OnChange".into())));
    assert_eq!(engine.signal("Mode").unwrap().values.len(), 3);

    let wiper = &network.environment_variables[0];
    assert_eq!(wiper.access_type, AccessType::ReadWrite);
    assert_eq!(wiper.comment, "wiper stage");
    assert_eq!(wiper.values.get(&3).map(String::as_str), Some("Fast"));
    assert_eq!(network.multiplexed_values.len(), 1);
}

#[test]
fn written_text_parses_back_to_the_same_network() {
    let first = parsed("powertrain", POWERTRAIN);
    let text = first.to_string();
    let second = parsed("written", &text);
    assert_eq!(first, second);
    assert_eq!(text, second.to_string());
}

#[test]
fn written_sections_keep_canonical_order() {
    let text = parsed("powertrain", POWERTRAIN).to_string();
    let order = [
        "VERSION \"1.2\"",
        "NS_ :",
        "BS_:",
        "BU_: Engine Dash Gateway",
        "VAL_TABLE_ OnOff 1 \"On\" 0 \"Off\" ;",
        "BO_ 100 EngineData: 8 Engine",
        " SG_ Mode M : 24|2@1+ (1,0) [0|3] \"\" Vector__XXX",
        "BO_TX_BU_ 100 : Engine,Gateway;",
        "EV_ Wiper: 0 [0|3] \"\" 0 1 DUMMY_NODE_VECTOR3 Dash;",
        "CM_ \"powertrain bus\";",
        "CM_ BU_ Engine \"engine controller\";",
        "CM_ BO_ 100 \"engine frame\nspanning lines\";",
        "CM_ SG_ 100 Rpm \"crank speed\";",
        "CM_ EV_ Wiper \"wiper stage\";",
        "BA_DEF_ BO_  \"Mode\" ENUM  \"Off\",\"On\",\"Standby\";",
        "BA_DEF_ SG_  \"Quality\" FLOAT 0 1.5;",
        "BA_DEF_DEF_  \"Quality\" 1;",
        "BA_ \"Owner\" \"team\";",
        "BA_ \"Mode\" BO_ 100 2;",
        "BA_ \"Quality\" SG_ 100 Rpm 0.5;",
        "VAL_ 100 Mode 0 \"Idle\" 1 \"Run\" 2 \"Stop\" ;",
        "VAL_ Wiper 0 \"Off\" 3 \"Fast\" ;",
        "SIG_VALTYPE_ 100 Torque : 1;",
        "SIG_GROUP_ 100 Core 1 : Rpm Temp;",
        "SG_MUL_VAL_ 100 Torque Mode 1-1;",
    ];
    let mut cursor = 0;
    for expected in order {
        let found = text[cursor..].find(expected).unwrap_or_else(|| panic!("'{expected}' missing or misplaced"));
        cursor += found + expected.len();
    }
}

#[test]
fn loading_twice_changes_nothing() {
    let once = parsed("powertrain", POWERTRAIN);
    let mut twice = parsed("powertrain", POWERTRAIN);
    twice.load_str("powertrain", POWERTRAIN).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn later_source_wins_scalars() {
    let mut network = parsed(
        "first",
        "BO_ 100 Old: 8 Engine\n\
         \x20SG_ Speed : 0|16@1+ (1,0) [0|100] \"km/h\" Dash\n\
         BA_ \"GenMsgCycleTime\" BO_ 100 10;\n\
         CM_ BO_ 100 \"first comment\";\n",
    );
    network
        .load_str(
            "second",
            "BO_ 100 New: 4 Vector__XXX\n\
             \x20SG_ Speed : 0|16@1+ (0.5,0) [0|50] \"kph\" Cluster\n\
             BA_ \"GenMsgCycleTime\" BO_ 100 20;\n",
        )
        .unwrap();

    let msg = network.message(MessageId(100)).unwrap();
    assert_eq!(msg.name, "New");
    assert_eq!(msg.size, 4);
    assert_eq!(msg.sender, Transmitter::NodeName("Engine".into()));
    assert_eq!(msg.comment, "first comment");
    assert_eq!(msg.attributes.get("GenMsgCycleTime"), Some(&AttrValue::Integer(20)));
    assert_eq!(msg.signals.len(), 1);
    let speed = &msg.signals[0];
    assert_eq!((speed.factor, speed.max), (0.5, 50.0));
    assert_eq!(speed.unit, "kph");
    assert_eq!(speed.receivers, vec!["Dash".to_owned(), "Cluster".to_owned()]);
}

#[test]
fn enum_ordinals_follow_each_source_then_the_merged_list() {
    let mut network = parsed(
        "first",
        "BO_ 1 Front: 8 Vector__XXX\n\
         BA_DEF_ BO_ \"Mode\" ENUM \"Off\",\"On\";\n\
         BA_ \"Mode\" BO_ 1 1;\n",
    );
    network
        .load_str(
            "second",
            "BO_ 2 Rear: 8 Vector__XXX\n\
             BA_DEF_ BO_ \"Mode\" ENUM \"On\",\"Standby\",\"Off\";\n\
             BA_ \"Mode\" BO_ 2 1;\n",
        )
        .unwrap();

    let def = network.attribute_def("Mode").unwrap();
    assert_eq!(def.values, vec!["Off".to_owned(), "On".to_owned(), "Standby".to_owned()]);
    let front = network.message(MessageId(1)).unwrap();
    let rear = network.message(MessageId(2)).unwrap();
    assert_eq!(front.attributes.get("Mode"), Some(&AttrValue::Enum("On".into())));
    assert_eq!(rear.attributes.get("Mode"), Some(&AttrValue::Enum("Standby".into())));

    let text = network.to_string();
    assert!(text.contains("BA_ \"Mode\" BO_ 1 1;"));
    assert!(text.contains("BA_ \"Mode\" BO_ 2 2;"));
}

#[test]
fn well_known_enum_keeps_canonical_order() {
    let network = parsed(
        "lower",
        "BO_ 1 Front: 8 Vector__XXX\n\
         BA_DEF_ BO_ \"VFrameFormat\" ENUM \"j1939pg\",\"standardcan\";\n\
         BA_ \"VFrameFormat\" BO_ 1 0;\n",
    );
    let def = network.attribute_def("VFrameFormat").unwrap();
    assert_eq!(def.values.first().map(String::as_str), Some("StandardCAN"));
    assert_eq!(def.values.last().map(String::as_str), Some("J1939PG"));
    let msg = network.message(MessageId(1)).unwrap();
    assert_eq!(msg.attributes.get("VFrameFormat"), Some(&AttrValue::Enum("J1939PG".into())));
}

#[test]
fn well_known_ordinals_survive_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let mut network = parsed(
        "front",
        "BO_ 1 Front: 8 Vector__XXX\n\
         BA_DEF_ BO_ \"VFrameFormat\" ENUM \"StandardCAN\",\"ExtendedCAN\";\n\
         BA_ \"VFrameFormat\" BO_ 1 1;\n",
    );
    // second source lists the same labels in another order and casing
    network
        .load_str(
            "rear",
            "BO_ 2 Rear: 8 Vector__XXX\n\
             BA_DEF_ BO_ \"VFrameFormat\" ENUM \"j1939pg\",\"standardcan\";\n\
             BA_ \"VFrameFormat\" BO_ 2 0;\n",
        )
        .unwrap();

    let output = dir.path().join("merged.dbc");
    network.save(Some(output.as_path())).unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("BA_ \"VFrameFormat\" BO_ 1 1;"));
    assert!(text.contains("BA_ \"VFrameFormat\" BO_ 2 3;"));

    let mut reloaded = Network::new();
    reloaded.load(&output).unwrap();
    let front = reloaded.message(MessageId(1)).unwrap();
    let rear = reloaded.message(MessageId(2)).unwrap();
    assert_eq!(front.attributes.get("VFrameFormat"), Some(&AttrValue::Enum("ExtendedCAN".into())));
    assert_eq!(rear.attributes.get("VFrameFormat"), Some(&AttrValue::Enum("J1939PG".into())));
    assert_eq!(
        reloaded.attribute_def("VFrameFormat").unwrap().values,
        network.attribute_def("VFrameFormat").unwrap().values
    );
    assert_eq!(network, reloaded);
}

#[test]
fn string_env_var_and_well_known_default_write_back() {
    let first = parsed(
        "body",
        "BU_: Dash\n\
         EV_ Label: 0 [0|0] \"\" 0 7 DUMMY_NODE_VECTOR8003 Dash;\n\
         BA_DEF_DEF_  \"GenMsgSendType\" \"CYCLIC\";\n",
    );
    let label = first.environment_variables.iter().find(|env| env.name == "Label").unwrap();
    assert_eq!(label.env_type, EnvType::String);
    assert_eq!(label.access_type, AccessType::ReadWrite);
    assert_eq!(
        first.attribute_def("GenMsgSendType").unwrap().default,
        Some(AttrValue::Enum("cyclic".into()))
    );

    let text = first.to_string();
    assert!(text.contains("EV_ Label: 2 [0|0] \"\" 0 7 DUMMY_NODE_VECTOR8003 Dash;"));
    assert!(text.contains("BA_DEF_DEF_  \"GenMsgSendType\" \"cyclic\";"));
    let second = parsed("written", &text);
    assert_eq!(first, second);
}

#[test]
fn comment_over_three_lines_keeps_blank_line() {
    let network = parsed(
        "comment",
        "BU_: Engine\nCM_ BU_ Engine \"line one\n\nline three\";\nBU_: Dash\n",
    );
    assert_eq!(network.node("Engine").unwrap().comment, "line one\n\nline three");
    assert!(network.node("Dash").is_some());
}

#[test]
fn structural_twins_merge_across_sources() {
    let mut network = parsed(
        "first",
        "BO_ 200 Body: 8 BCM\n\
         \x20SG_ Door : 0|2@1+ (1,0) [0|3] \"\" Dash\n\
         VAL_ 200 Door 0 \"Closed\" 1 \"Open\" ;\n",
    );
    network
        .load_str(
            "second",
            "BO_ 200 Body: 8 BCM\n\
             \x20SG_ DoorState : 0|2@1+ (1,0) [0|3] \"\" Dash\n\
             VAL_ 200 DoorState 2 \"Ajar\" ;\n",
        )
        .unwrap();

    let body = network.message(MessageId(200)).unwrap();
    assert_eq!(body.signals.len(), 1);
    let door = &body.signals[0];
    assert_eq!(door.name, "DoorState");
    assert_eq!(door.values.len(), 3);
    assert!(body.signal("Door").is_some());
    assert!(network.to_string().contains("VAL_ 200 DoorState 0 \"Closed\" 1 \"Open\" 2 \"Ajar\" ;"));
}

#[test]
fn twins_within_one_source_write_back_equal() {
    let first = parsed(
        "door",
        "BU_: BCM\n\
         BO_ 100 Door: 8 BCM\n\
         \x20SG_ Lock : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX\n\
         \x20SG_ LockState : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX\n\
         VAL_ 100 Lock 0 \"Unlocked\" 1 \"Locked\" ;\n",
    );
    let door = first.message(MessageId(100)).unwrap();
    assert_eq!(door.signals.len(), 1);
    assert_eq!(door.signals[0].name, "LockState");
    assert_eq!(door.signals[0].aliases, vec!["Lock".to_owned()]);
    assert_eq!(door.signals[0].values.len(), 2);

    let second = parsed("written", &first.to_string());
    assert!(second.message(MessageId(100)).unwrap().signals[0].aliases.is_empty());
    assert_eq!(first, second);
}

#[test]
fn independent_signals_stay_apart() {
    let network = parsed(
        "independent",
        "BO_ 3221225472 VECTOR__INDEPENDENT_SIG_MSG: 0 Vector__XXX\n\
         \x20SG_ Alpha : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX\n\
         \x20SG_ Beta : 0|8@1+ (1,0) [0|255] \"\" Vector__XXX\n",
    );
    assert_eq!(network.messages[0].signals.len(), 2);
}

#[test]
fn id_order_compares_text() {
    let mut network = parsed(
        "ids",
        "BO_ 20 Twenty: 8 Vector__XXX\nBO_ 3 Three: 8 Vector__XXX\nBO_ 100 Hundred: 8 Vector__XXX\n",
    );
    network.sort(SortKey::Id);
    let text = network.to_string();
    let hundred = text.find("BO_ 100 ").unwrap();
    let twenty = text.find("BO_ 20 ").unwrap();
    let three = text.find("BO_ 3 ").unwrap();
    assert!(hundred < twenty && twenty < three);
}

#[test]
fn unknown_records_are_reported_not_fatal() {
    let mut network = Network::new();
    let report = network
        .load_str("odd", "BU_: A\nBU_SG_REL_ \"x\" BU_ A SG_ 1 S 3;\nBO_ 1 M: 8 A\n")
        .unwrap();
    assert_eq!(report.unparsed.len(), 1);
    assert_eq!(report.unparsed[0].line, 2);
    assert_eq!(report.lines, 3);
    assert_eq!(network.messages.len(), 1);
}

#[test]
fn save_next_to_source_and_reload() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("bus.dbc");
    fs::write(&source, POWERTRAIN).unwrap();

    let mut network = Network::new();
    network.load(&source).unwrap();
    let saved = network.save(None).unwrap();
    assert_eq!(saved, dir.path().join("bus_merged.dbc"));

    let explicit = dir.path().join("copy.dbc");
    assert_eq!(network.save(Some(explicit.as_path())).unwrap(), explicit);

    let mut reloaded = Network::new();
    reloaded.load(&saved).unwrap();
    assert_eq!(network, reloaded);
    assert_eq!(fs::read_to_string(&saved).unwrap(), fs::read_to_string(&explicit).unwrap());
}

#[test]
fn save_without_any_path_fails() {
    let error = Network::new().save(None).unwrap_err();
    assert_eq!(error.get_uid(), "source-io");
}

#[test]
fn missing_file_is_source_io() {
    let dir = TempDir::new().unwrap();
    let error = Network::new().load(dir.path().join("absent.dbc")).unwrap_err();
    assert!(matches!(error, DbcError::SourceIO { .. }));
}

#[cfg(all(feature = "serde", feature = "serde_json"))]
#[test]
fn json_dump_names_messages() {
    let json = parsed("powertrain", POWERTRAIN).to_json().unwrap();
    assert!(json.contains("\"EngineData\""));
    assert!(json.contains("\"Wiper\""));
}
