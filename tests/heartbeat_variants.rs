use signalr_classic::Heartbeat;

#[test]
fn normal_heartbeat_carries_its_reason_in_display() {
    let hb = Heartbeat::Normal("refreshed by subscription signal".to_owned());
    assert_eq!(hb.to_string(), "Thump thump! - refreshed by subscription signal");
}

#[test]
fn awkward_heartbeat_display_omits_the_frame_dump() {
    let hb = Heartbeat::Awkward {
        identifier: "7".to_owned(),
        frame_dump: r#"{"I":"7","C":"d-abc,2"}"#.to_owned(),
    };
    assert_eq!(hb.to_string(), "Thud thud!");
}
