use std::io::{BufRead, Write};

use anyhow::{bail, Context};
use serde_json::{json, Value};

use tether_core::{LocationPreset, RecordId, Reminder, Session, Trigger};
use tether_crypto::{export_recovery_artifact, Keypair, PublicKey};
use tether_store::{
    restore_account, Acknowledgement, Onboarding, OnboardingError, RegenerationConsent,
};
use tether_sync::{BatchOutcome, RefreshReport, SkipReason, SyncConfig};

use crate::app::App;
use crate::{Cli, Commands, PresetCommand, ReminderCommand, ReminderFields};

const DEFAULT_RADIUS_M: u32 = 100;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SyncConfig::load().context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let passphrase = cli
        .passphrase
        .context("a passphrase is required: pass --passphrase or set TETHER_PASSPHRASE")?;

    let mut app = App::open(config, &passphrase, cli.low_memory).await?;
    let result = dispatch(&app, cli.command).await;
    app.settle().await;
    print(&result?)
}

async fn dispatch(app: &App, command: Commands) -> anyhow::Result<Value> {
    match command {
        Commands::Init { yes } => cmd_init(app, yes).await,
        Commands::RecoveryKey => cmd_recovery_key(app).await,
        Commands::Restore { artifact } => cmd_restore(app, &artifact).await,
        Commands::RegenerateKeys {
            i_understand_data_loss,
        } => cmd_regenerate(app, i_understand_data_loss).await,
        Commands::Whoami => cmd_whoami(app).await,
        Commands::Login { user, token } => {
            app.sessions
                .save(&Session {
                    user_id: user.clone(),
                    token,
                })
                .await?;
            Ok(json!({ "signed_in": user }))
        }
        Commands::Logout => {
            app.sessions.clear().await?;
            Ok(json!({ "signed_in": null }))
        }
        Commands::Reminder(cmd) => cmd_reminder(app, cmd).await,
        Commands::Preset(cmd) => cmd_preset(app, cmd).await,
        Commands::Sync => {
            let reminders = app.reminders.refresh().await?;
            let presets = app.presets.refresh().await?;
            Ok(json!({
                "reminders": report_json(&reminders),
                "location_presets": report_json(&presets),
            }))
        }
        Commands::Seal { text, to } => {
            let recipient = match to {
                Some(encoded) => PublicKey::from_base64(&encoded)?,
                None => require_keypair(app).await?.public,
            };
            Ok(json!({
                "recipient": recipient.fingerprint().to_string(),
                "payload": tether_crypto::seal(&text, &recipient)?,
            }))
        }
        Commands::Open { payload } => {
            let keypair = require_keypair(app).await?;
            Ok(json!({ "plaintext": tether_crypto::open(&payload, &keypair.private)? }))
        }
    }
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Keys and onboarding
// ============================================================================

const KEY_LOSS_HINT: &str = "this account already has encrypted data; run `tether restore <recovery key>` \
     or `tether regenerate-keys --i-understand-data-loss`";

async fn cmd_init(app: &App, yes: bool) -> anyhow::Result<Value> {
    let prior = match app.keys.load().await? {
        Some(_) => false,
        None => app.has_prior_encrypted_data().await?,
    };
    let mut flow = Onboarding::signup();
    let fingerprint = match flow.generate_keys(&app.keys, prior).await {
        Ok(keypair) => keypair.public.fingerprint(),
        Err(OnboardingError::Store(tether_core::Error::KeyLoss(_))) => bail!(KEY_LOSS_HINT),
        Err(e) => return Err(e.into()),
    };

    let artifact = flow.show_recovery_key()?;
    eprintln!("Recovery key (store it somewhere safe, it is the only way back in):\n");
    eprintln!("    {}\n", artifact.as_str());

    if yes || prompt_confirmation()? {
        flow.confirm_recovery_key(Acknowledgement::user_confirmed())?;
    }
    flow.finish()?;

    Ok(json!({
        "state": flow.state().to_string(),
        "fingerprint": fingerprint.to_string(),
    }))
}

fn prompt_confirmation() -> anyhow::Result<bool> {
    eprint!("Type 'saved' once the recovery key is stored: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("saved"))
}

async fn cmd_recovery_key(app: &App) -> anyhow::Result<Value> {
    let keypair = require_keypair(app).await?;
    Ok(json!({
        "fingerprint": keypair.public.fingerprint().to_string(),
        "recovery_key": export_recovery_artifact(&keypair).as_str(),
    }))
}

async fn cmd_restore(app: &App, artifact: &str) -> anyhow::Result<Value> {
    let mut flow = restore_account(&app.keys, artifact)
        .await
        .context("recovery key rejected")?;
    let keypair = flow.finish()?;
    Ok(json!({
        "state": flow.state().to_string(),
        "fingerprint": keypair.public.fingerprint().to_string(),
    }))
}

async fn cmd_regenerate(app: &App, acknowledged: bool) -> anyhow::Result<Value> {
    if !acknowledged {
        bail!("refusing to replace the keypair without --i-understand-data-loss");
    }
    let keypair = app
        .keys
        .regenerate_keypair(RegenerationConsent::acknowledge_data_loss())
        .await?;
    eprintln!("New recovery key:\n\n    {}\n", export_recovery_artifact(&keypair).as_str());
    Ok(json!({ "fingerprint": keypair.public.fingerprint().to_string() }))
}

async fn require_keypair(app: &App) -> anyhow::Result<Keypair> {
    app.keys
        .load()
        .await?
        .context("no keypair on this device; run `tether init` or `tether restore`")
}

async fn cmd_whoami(app: &App) -> anyhow::Result<Value> {
    let session = app.sessions.load().await?;
    let keypair = app.keys.load().await?;
    Ok(json!({
        "user": session.map(|s| s.user_id),
        "fingerprint": keypair.as_ref().map(|k| k.public.fingerprint().to_string()),
        "public_key": keypair.as_ref().map(|k| k.public.to_base64()),
        "api": app.config.api_base_url,
        "data_dir": app.config.data_dir.to_string_lossy(),
        "reminders": app.reminders.records().await.len(),
        "location_presets": app.presets.records().await.len(),
    }))
}

// ============================================================================
// Records
// ============================================================================

fn parse_ids(ids: &[String]) -> anyhow::Result<Vec<RecordId>> {
    ids.iter()
        .map(|id| id.parse::<RecordId>().map_err(Into::into))
        .collect()
}

fn apply_fields(reminder: &mut Reminder, fields: ReminderFields) -> anyhow::Result<()> {
    if let Some(task) = fields.task {
        reminder.task = task;
    }
    if let Some(location) = fields.location {
        reminder.location_name = location;
    }
    if let Some(lat) = fields.lat {
        reminder.latitude = lat;
    }
    if let Some(lon) = fields.lon {
        reminder.longitude = lon;
    }
    if let Some(radius) = fields.radius {
        reminder.radius_m = radius;
    }
    if let Some(trigger) = fields.trigger {
        reminder.trigger = trigger.parse::<Trigger>()?;
    }
    Ok(())
}

async fn cmd_reminder(app: &App, cmd: ReminderCommand) -> anyhow::Result<Value> {
    let engine = &app.reminders;
    match cmd {
        ReminderCommand::Add { fields } => {
            let (Some(task), Some(location), Some(lat), Some(lon)) = (
                fields.task.clone(),
                fields.location.clone(),
                fields.lat,
                fields.lon,
            ) else {
                bail!("--task, --location, --lat and --lon are required");
            };
            let mut reminder = Reminder::new(
                task,
                location,
                lat,
                lon,
                fields.radius.unwrap_or(DEFAULT_RADIUS_M),
            );
            apply_fields(&mut reminder, fields)?;
            Ok(serde_json::to_value(engine.create(reminder).await?)?)
        }
        ReminderCommand::List { all } => {
            let records: Vec<Reminder> = engine
                .records()
                .await
                .into_iter()
                .filter(|r| all || !r.archived)
                .collect();
            Ok(serde_json::to_value(records)?)
        }
        ReminderCommand::Update { id, fields } => {
            let id: RecordId = id.parse()?;
            let mut reminder = engine
                .get(&id)
                .await
                .with_context(|| format!("no reminder {}", id))?;
            apply_fields(&mut reminder, fields)?;
            reminder.updated_at = chrono::Utc::now();
            Ok(serde_json::to_value(engine.update(reminder).await?)?)
        }
        ReminderCommand::Archive { ids } => {
            Ok(batch_json(&engine.archive_many(&parse_ids(&ids)?).await?))
        }
        ReminderCommand::Unarchive { ids } => {
            Ok(batch_json(&engine.restore_many(&parse_ids(&ids)?).await?))
        }
        ReminderCommand::Delete { ids } => {
            Ok(batch_json(&engine.delete_many(&parse_ids(&ids)?).await?))
        }
    }
}

async fn cmd_preset(app: &App, cmd: PresetCommand) -> anyhow::Result<Value> {
    let engine = &app.presets;
    match cmd {
        PresetCommand::Add {
            name,
            address,
            lat,
            lon,
        } => {
            let preset = LocationPreset::new(name, address, lat, lon);
            Ok(serde_json::to_value(engine.create(preset).await?)?)
        }
        PresetCommand::List => Ok(serde_json::to_value(engine.records().await)?),
        PresetCommand::Delete { ids } => {
            Ok(batch_json(&engine.delete_many(&parse_ids(&ids)?).await?))
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn batch_json(outcome: &BatchOutcome) -> Value {
    json!({
        "requested": outcome.requested,
        "applied": outcome.applied,
        "remote_failed": outcome
            .remote_failed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    })
}

fn report_json(report: &RefreshReport) -> Value {
    match report {
        RefreshReport::Synced {
            records,
            undecryptable,
            pushed,
            push_failed,
            deletes_retried,
        } => json!({
            "status": "synced",
            "records": records,
            "undecryptable": undecryptable,
            "pushed": pushed,
            "push_failed": push_failed,
            "deletes_retried": deletes_retried,
        }),
        RefreshReport::Offline { reason } => json!({
            "status": "offline",
            "reason": reason,
        }),
        RefreshReport::Skipped(reason) => json!({
            "status": "skipped",
            "reason": match reason {
                SkipReason::NoSession => "not signed in",
                SkipReason::NoKeypair => "no keypair on this device",
            },
        }),
    }
}
