use std::path::PathBuf;

use clap::Parser;
use courier_cli::{Cli, Command, ConfigCommand};

// Argument parsing for every subcommand, without touching the network or disk.

#[test]
fn test_run_is_parsed_without_flags() {
    let cli = Cli::try_parse_from(["courier", "run"]).unwrap();
    assert!(matches!(cli.command, Command::Run));
    assert!(!cli.dry_run);
    assert!(cli.config_dir.is_none());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli =
        Cli::try_parse_from(["courier", "once", "--dry-run", "--config-dir", "/tmp/courier"])
            .unwrap();
    assert!(matches!(cli.command, Command::Once));
    assert!(cli.dry_run);
    assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/courier")));
}

#[test]
fn test_sync_acl_uses_kebab_case_name() {
    let cli = Cli::try_parse_from(["courier", "sync-acl"]).unwrap();
    assert!(matches!(cli.command, Command::SyncAcl));
    assert!(Cli::try_parse_from(["courier", "sync_acl"]).is_err());
}

#[test]
fn test_extract_collects_repeated_bodies() {
    let cli = Cli::try_parse_from([
        "courier",
        "extract",
        "--title",
        "Raid night 2024-05-01 18:00 UTC",
        "--body",
        "first block",
        "--body",
        "second block",
        "--timezone",
        "Europe/Berlin",
    ])
    .unwrap();
    let Command::Extract(args) = cli.command else {
        panic!("expected extract");
    };
    assert_eq!(args.title, "Raid night 2024-05-01 18:00 UTC");
    assert_eq!(args.body, vec!["first block", "second block"]);
    assert_eq!(args.timezone.as_deref(), Some("Europe/Berlin"));
}

#[test]
fn test_extract_requires_title() {
    assert!(Cli::try_parse_from(["courier", "extract", "--body", "text"]).is_err());
}

#[test]
fn test_config_init_force_flag() {
    let cli = Cli::try_parse_from(["courier", "config", "init", "--force"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Config(ConfigCommand::Init { force: true })
    ));

    let cli = Cli::try_parse_from(["courier", "config", "path"]).unwrap();
    assert!(matches!(cli.command, Command::Config(ConfigCommand::Path)));
}

#[test]
fn test_missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["courier"]).is_err());
}
