//! Tests for installer CLI parsing and default behaviours.

use super::*;
use rstest::rstest;

fn install_args(cli: Cli) -> InstallArgs {
    match cli.command {
        Command::Install(args) => args,
        other => panic!("expected Install command, got {other:?}"),
    }
}

#[test]
fn install_parses_defaults() {
    let cli = Cli::parse_from(["formula-installer", "install", "claude-cli.toml"]);
    let args = install_args(cli);

    assert_eq!(args.manifest, Utf8PathBuf::from("claude-cli.toml"));
    assert!(args.prefix.is_none());
    assert!(args.cellar.is_none());
    assert!(!args.force);
    assert!(!args.dry_run);
    assert!(args.attempts.is_none());
    assert_eq!(args.verbosity, 0);
    assert!(!args.quiet);
}

#[test]
fn install_parses_all_flags() {
    let cli = Cli::parse_from([
        "formula-installer",
        "install",
        "--cellar",
        "/opt/Cellar",
        "--force",
        "--dry-run",
        "--attempts",
        "5",
        "-vv",
        "claude-cli.toml",
    ]);
    let args = install_args(cli);

    assert_eq!(args.cellar, Some(Utf8PathBuf::from("/opt/Cellar")));
    assert!(args.force);
    assert!(args.dry_run);
    assert_eq!(args.attempts, Some(5));
    assert_eq!(args.verbosity, 2);
}

#[test]
fn install_parses_prefix() {
    let cli = Cli::parse_from([
        "formula-installer",
        "install",
        "--prefix",
        "/tmp/claude",
        "claude-cli.toml",
    ]);
    assert_eq!(
        install_args(cli).prefix,
        Some(Utf8PathBuf::from("/tmp/claude"))
    );
}

#[test]
fn check_parses_manifest_and_no_probe() {
    let cli = Cli::parse_from(["formula-installer", "check", "--no-probe", "claude-cli.toml"]);
    match cli.command {
        Command::Check(args) => {
            assert_eq!(args.manifest, Utf8PathBuf::from("claude-cli.toml"));
            assert!(args.no_probe);
        }
        other => panic!("expected Check command, got {other:?}"),
    }
}

#[test]
fn checksum_accepts_url() {
    let cli = Cli::parse_from([
        "formula-installer",
        "checksum",
        "https://github.com/jarmez/claude-cli/archive/v0.1.0.tar.gz",
    ]);
    match cli.command {
        Command::Checksum(args) => assert!(args.target.starts_with("https://")),
        other => panic!("expected Checksum command, got {other:?}"),
    }
}

#[rstest]
#[case::missing_subcommand(&["formula-installer"][..])]
#[case::missing_manifest(&["formula-installer", "install"][..])]
#[case::quiet_and_verbose(&["formula-installer", "install", "-q", "-v", "m.toml"][..])]
#[case::prefix_and_cellar(
    &["formula-installer", "install", "--prefix", "/a", "--cellar", "/b", "m.toml"][..]
)]
#[case::zero_attempts(&["formula-installer", "install", "--attempts", "0", "m.toml"][..])]
fn invalid_invocations_are_rejected(#[case] argv: &[&str]) {
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn for_manifest_matches_parsed_defaults() {
    let parsed = install_args(Cli::parse_from([
        "formula-installer",
        "install",
        "claude-cli.toml",
    ]));
    let built = InstallArgs::for_manifest("claude-cli.toml");

    assert_eq!(parsed.manifest, built.manifest);
    assert_eq!(parsed.force, built.force);
    assert_eq!(parsed.attempts, built.attempts);
    assert_eq!(parsed.verbosity, built.verbosity);
}
