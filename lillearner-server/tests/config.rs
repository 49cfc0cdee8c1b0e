use lillearner_server::server::{AppConfig, ConfigError, DEFAULT_PORT};

#[test]
fn empty_document_yields_defaults() {
    let cfg = AppConfig::from_yaml_str("").unwrap();
    assert_eq!(cfg.port(), DEFAULT_PORT);
    assert_eq!(cfg.timezone, "UTC");
    assert!(cfg.gamification);
    assert_eq!(cfg.achievement_bonus_xp, 0);
    assert!(cfg.llm.is_none());
    assert_eq!(cfg.resolve_catalog().unwrap().categories.len(), 8);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppConfig::load_from_path(dir.path().join("absent.yaml")).unwrap();
    assert_eq!(cfg.port(), DEFAULT_PORT);
}

#[test]
fn reads_settings_and_llm_defaults() {
    let yaml = r#"
listen_port: 8080
timezone: Europe/Warsaw
achievement_bonus_xp: 25
llm:
  base_url: https://api.example.com/v1
  model: small-model
"#;
    let cfg = AppConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(cfg.port(), 8080);
    assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Warsaw);
    assert_eq!(cfg.achievement_bonus_xp, 25);
    let llm = cfg.llm.unwrap();
    assert_eq!(llm.api_key_env, "LLM_API_KEY");
    assert_eq!(llm.timeout_secs, 30);
    assert!((llm.temperature - 0.1).abs() < f32::EPSILON);
}

#[test]
fn unknown_timezone_is_rejected() {
    let err = AppConfig::from_yaml_str("timezone: Mars/Olympus").unwrap_err();
    assert!(matches!(err, ConfigError::Timezone(tz) if tz == "Mars/Olympus"));
}

#[test]
fn inline_catalog_replaces_the_bundled_one() {
    let yaml = r#"
catalog:
  categories:
    - id: music
      name: Music
      skills:
        - { id: piano, name: Piano, tracking: activity_log }
  achievements:
    - { key: first_song, name: First Song, description: One piano entry, group: category, criteria: { type: entry_count, skill_id: piano, target: 1 } }
"#;
    let catalog = AppConfig::from_yaml_str(yaml)
        .unwrap()
        .resolve_catalog()
        .unwrap();
    assert_eq!(catalog.categories.len(), 1);
    assert_eq!(catalog.skill("piano").unwrap().0.id, "music");
    assert!(catalog.achievement("first_song").is_some());
}

#[test]
fn duplicate_catalog_ids_are_rejected() {
    let yaml = r#"
catalog:
  categories:
    - { id: music, name: Music }
    - { id: music, name: More Music }
"#;
    let err = AppConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Catalog(_)));
}
