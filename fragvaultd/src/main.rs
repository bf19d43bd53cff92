use std::path::{Path, PathBuf};

use anyhow::Context;
use fragvault_core::{Policy, PolicyPair, Viewer, ZipArchiveReader};
use fragvault_integrations::ids::DAEMON_NAME;
use fragvaultd::config::{DaemonConfig, load_mail_settings};
use fragvaultd::mail::{CreateTaskReceiver, ReceivedMail, StaticUserDirectory};
use fragvaultd::preferences::{DiffPreferencesPanel, PreferencesStore};
use fragvaultd::store::{FragmentStore, SqliteFragmentStore};
use fragvaultd::sync::{SyncOutcome, Synchronizer};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Sync {
        base_path: String,
        archive: PathBuf,
        view: Option<Policy>,
        edit: Option<Policy>,
    },
    Show {
        path: String,
    },
    List {
        base_path: String,
    },
    Prefs {
        user: String,
        filetree: Option<bool>,
    },
    Mail {
        message: PathBuf,
    },
    Help,
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => anyhow::bail!("expected on/off, got: {other}"),
    }
}

fn parse_cli_command<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(CliCommand::Help);
    };
    let mut positional = Vec::new();
    let mut view: Option<Policy> = None;
    let mut edit: Option<Policy> = None;
    let mut filetree = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--view" | "--edit" | "--filetree" => {
                let value = args
                    .next()
                    .with_context(|| format!("{arg} requires a value"))?;
                match arg.as_str() {
                    "--view" => view = Some(value.parse::<Policy>()?),
                    "--edit" => edit = Some(value.parse::<Policy>()?),
                    _ => filetree = Some(parse_switch(&value)?),
                }
            }
            "--help" | "-h" => return Ok(CliCommand::Help),
            other if other.starts_with("--") => anyhow::bail!("unknown argument: {other}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let mut required = |name: &str| {
        positional
            .next()
            .with_context(|| format!("missing <{name}> for {command}"))
    };
    let parsed = match command.as_str() {
        "sync" => CliCommand::Sync {
            base_path: required("base-path")?,
            archive: PathBuf::from(required("archive-file")?),
            view,
            edit,
        },
        "show" => CliCommand::Show {
            path: required("path")?,
        },
        "ls" => CliCommand::List {
            base_path: required("base-path")?,
        },
        "prefs" => CliCommand::Prefs {
            user: required("user")?,
            filetree,
        },
        "mail" => CliCommand::Mail {
            message: PathBuf::from(required("message-file")?),
        },
        "help" | "--help" | "-h" => CliCommand::Help,
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = positional.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(parsed)
}

fn print_help() {
    println!("Usage: {DAEMON_NAME} <command> [options]");
    println!("  sync <base-path> <archive-file> [--view P] [--edit P]");
    println!("                          Store a zip archive and mirror it below base-path");
    println!("  show <path>             Print a fragment and its version history");
    println!("  ls <base-path>          List fragments below base-path");
    println!("  prefs <user> [--filetree on|off]");
    println!("                          Show or change diff preferences");
    println!("  mail <message-file>     Turn a JSON mail into a task draft");
    println!("Policies: public, users, admin, no-one, user:<id>");
}

#[derive(Serialize)]
struct FragmentDetails {
    fragment: fragvault_core::Fragment,
    versions: Vec<fragvault_core::FragmentVersion>,
    latest_size: Option<usize>,
}

async fn run_sync(
    config: &DaemonConfig,
    store: SqliteFragmentStore,
    base_path: &str,
    archive: &Path,
    policy: PolicyPair,
) -> anyhow::Result<()> {
    let size = tokio::fs::metadata(archive)
        .await
        .with_context(|| format!("failed to stat {}", archive.display()))?
        .len();
    if size > config.max_archive_bytes {
        anyhow::bail!(
            "archive is {size} bytes, above the {} byte limit",
            config.max_archive_bytes
        );
    }
    let blob = tokio::fs::read(archive)
        .await
        .with_context(|| format!("failed to read {}", archive.display()))?;

    let reader = ZipArchiveReader::with_limit(config.max_expanded_bytes);
    let synchronizer = Synchronizer::with_reader(store, reader);
    let outcome = synchronizer
        .synchronize(&Viewer::Omnipotent, base_path, &blob, &policy)
        .await?;
    match outcome {
        SyncOutcome::Complete(report) => {
            let counts = report.counts;
            println!(
                "{base_path}: version {} stored; {} files and {} directories created, {} updated, {} deleted, {} unchanged directories",
                report.root_version.sequence,
                counts.created_files,
                counts.created_directories,
                counts.updated,
                counts.deleted,
                counts.skipped_directories,
            );
        }
        SyncOutcome::Degraded {
            root_version,
            reason,
        } => {
            println!(
                "{base_path}: version {} stored without expansion ({reason})",
                root_version.sequence
            );
        }
    }
    Ok(())
}

async fn run_show(store: &SqliteFragmentStore, path: &str) -> anyhow::Result<()> {
    let fragment = store
        .fragment_by_path(path.trim_matches('/'))
        .await?
        .with_context(|| format!("no fragment at {path}"))?;
    let versions = store.versions(fragment.id).await?;
    let latest_size = match fragment
        .latest_version
        .as_ref()
        .and_then(|version| version.content_digest.as_deref())
    {
        Some(digest) => store.load_content(digest).await?.map(|data| data.len()),
        None => None,
    };
    let details = FragmentDetails {
        fragment,
        versions,
        latest_size,
    };
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

async fn run_list(store: &SqliteFragmentStore, base_path: &str) -> anyhow::Result<()> {
    for fragment in store.query_by_prefix(base_path.trim_matches('/')).await? {
        let kind = if fragment.is_directory() { "dir" } else { "file" };
        let sequence = fragment
            .latest_sequence()
            .map(|sequence| sequence.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{kind}\t{sequence}\t{}", fragment.path);
    }
    Ok(())
}

async fn run_prefs(
    store: &SqliteFragmentStore,
    user: &str,
    filetree: Option<bool>,
) -> anyhow::Result<()> {
    let panel = DiffPreferencesPanel::new(PreferencesStore::from_pool(store.pool().clone()));
    let preferences = match filetree {
        Some(filetree) => panel.save(user, filetree).await?.preferences,
        None => panel.load(user).await?,
    };
    println!(
        "{} > {} ({})",
        DiffPreferencesPanel::GROUP,
        DiffPreferencesPanel::NAME,
        DiffPreferencesPanel::panel_uri()
    );
    println!("  {}", DiffPreferencesPanel::FILETREE_CAPTION);
    println!(
        "  filetree={} nav-collapsed={}",
        preferences.filetree, preferences.nav_collapsed
    );
    Ok(())
}

async fn run_mail(config: &DaemonConfig, message: &Path) -> anyhow::Result<()> {
    let settings_path = config
        .mail_config
        .as_deref()
        .context("FRAGVAULT_MAIL_CONFIG is not set")?;
    let settings = load_mail_settings(settings_path)?;
    let raw = tokio::fs::read_to_string(message)
        .await
        .with_context(|| format!("failed to read {}", message.display()))?;
    let mail: ReceivedMail = serde_json::from_str(&raw).context("invalid mail message")?;

    let receiver = CreateTaskReceiver::new(settings.receiver);
    let directory = StaticUserDirectory::new(settings.users);
    match receiver.receive(&mail, &directory)? {
        Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
        None => println!("mail not accepted by the task receiver"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fragvaultd=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = parse_cli_command(std::env::args())?;
    if command == CliCommand::Help {
        print_help();
        return Ok(());
    }

    let config = DaemonConfig::from_env()?;
    if let CliCommand::Mail { message } = &command {
        return run_mail(&config, message).await;
    }

    let store = SqliteFragmentStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))?;
    info!(db = %config.db_path.display(), "store opened");

    match command {
        CliCommand::Sync {
            base_path,
            archive,
            view,
            edit,
        } => {
            let policy = PolicyPair::new(
                view.unwrap_or_else(|| config.default_policy.view.clone()),
                edit.unwrap_or_else(|| config.default_policy.edit.clone()),
            );
            run_sync(&config, store, &base_path, &archive, policy).await
        }
        CliCommand::Show { path } => run_show(&store, &path).await,
        CliCommand::List { base_path } => run_list(&store, &base_path).await,
        CliCommand::Prefs { user, filetree } => run_prefs(&store, &user, filetree).await,
        CliCommand::Mail { .. } | CliCommand::Help => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once(DAEMON_NAME)
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_command_prints_help() {
        assert_eq!(parse_cli_command(args(&[])).unwrap(), CliCommand::Help);
        assert_eq!(parse_cli_command(args(&["--help"])).unwrap(), CliCommand::Help);
    }

    #[test]
    fn parses_sync_with_policies() {
        let command = parse_cli_command(args(&[
            "sync",
            "tree-root",
            "tree.zip",
            "--view",
            "public",
            "--edit",
            "user:alice",
        ]))
        .unwrap();
        assert_eq!(
            command,
            CliCommand::Sync {
                base_path: "tree-root".into(),
                archive: PathBuf::from("tree.zip"),
                view: Some(Policy::Public),
                edit: Some(Policy::User("alice".into())),
            }
        );
    }

    #[test]
    fn parses_prefs_switch() {
        assert_eq!(
            parse_cli_command(args(&["prefs", "alice", "--filetree", "on"])).unwrap(),
            CliCommand::Prefs {
                user: "alice".into(),
                filetree: Some(true),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_cli_command(args(&["sync", "root"])).is_err());
        assert!(parse_cli_command(args(&["show", "a", "b"])).is_err());
        assert!(parse_cli_command(args(&["sync", "root", "a.zip", "--view", "everyone"])).is_err());
        assert!(parse_cli_command(args(&["frobnicate"])).is_err());
        assert!(parse_cli_command(args(&["ls", "root", "--verbose"])).is_err());
    }
}
