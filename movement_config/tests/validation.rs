use movement_config::load_toml;
use rstest::rstest;

const GOOD: &str = r#"
[hands.hours]
stepper_pins = [4, 17, 27, 22]
rpm = 3.0
period_secs = 43200
update_secs = 300
steps = 4096
encoder_pin = 24
mark_width = 200
offset = 2100

[hands.seconds]
stepper_pins = [5, 6, 13, 19]
rpm = 6.0
period_secs = 60
update_secs = 1
steps = 4017
encoder_pin = 25
mark_width = 100
invert = true

[logging]
level = "debug"
"#;

#[test]
fn accepts_a_complete_config() {
    let cfg = load_toml(GOOD).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.hands.len(), 2);
    let hours = &cfg.hands["hours"];
    assert_eq!(hours.stepper_pins, [4, 17, 27, 22]);
    assert_eq!(hours.offset, 2100);
    assert!(!hours.invert);
    // debounce defaults when omitted
    assert_eq!(hours.debounce, 5);
    assert!(cfg.hands["seconds"].invert);
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
}

#[test]
fn rejects_an_empty_hand_table() {
    let cfg = load_toml("[hands]\n").expect("parse TOML");
    let err = cfg.validate().expect_err("no hands");
    assert!(format!("{err}").contains("no hands"));
}

#[rstest]
#[case("steps = 4096", "steps = 30", "steps per revolution")]
#[case("rpm = 3.0", "rpm = 0.0", "rpm must be > 0")]
#[case("rpm = 3.0", "rpm = -2.0", "rpm must be > 0")]
#[case("update_secs = 300", "update_secs = 0", "update_secs must be > 0")]
#[case("period_secs = 43200", "period_secs = 200", "period_secs must be >= update_secs")]
#[case("mark_width = 200", "mark_width = 0", "mark_width must be > 0")]
fn rejects_out_of_range_values(
    #[case] good: &str,
    #[case] bad: &str,
    #[case] message: &str,
) {
    let toml = GOOD.replacen(good, bad, 1);
    assert_ne!(toml, GOOD, "case does not appear in the fixture");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(message),
        "unexpected error for {bad}: {err}"
    );
}

#[test]
fn rejects_missing_required_fields() {
    let toml = r#"
[hands.hours]
rpm = 3.0
period_secs = 43200
update_secs = 300
steps = 4096
encoder_pin = 24
mark_width = 200
"#;
    assert!(load_toml(toml).is_err(), "stepper_pins is required");
}

#[test]
fn error_names_the_offending_hand() {
    let toml = GOOD.replacen("steps = 4017", "steps = 10", 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("rejected");
    assert!(format!("{err}").starts_with("seconds:"));
}
