use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::commands;
use crate::api::AppState;
use crate::shared::emit::ChannelSink;
use crate::shared::error::{AppError, AppResult};
use crate::shared::events::PipelineEvent;
use crate::shared::settings::{AppSettings, TranslationSettings};
use crate::shared::types::TranslationDirection;

#[derive(Parser, Debug)]
#[command(name = "scriptdesk", version, about = "ScriptDesk - streaming Hindi/English translation and script library")]
pub struct CliArgs {
    /// Enable debug mode with verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Translate text, printing fragments as they arrive
    Translate {
        /// Translate from the target language back to the source language
        #[arg(long)]
        reverse: bool,
        /// Text to translate, or `-` to read stdin
        text: String,
    },
    /// Show or clear translation history
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Manage scripts
    Scripts {
        #[command(subcommand)]
        action: Option<ScriptAction>,
    },
    /// Inspect or change settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    List,
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ScriptAction {
    List,
    New {
        title: Option<String>,
    },
    Show {
        id: String,
    },
    /// Replace a script's content from a file, or stdin when no file is given
    Save {
        id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Rename {
        id: String,
        title: String,
    },
    Delete {
        id: String,
    },
    /// Write a printable HTML copy
    Export {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print settings with secrets masked
    Show,
    /// Store the Gemini API key in the OS keyring (reads stdin when omitted)
    SetKey {
        key: Option<String>,
    },
    /// Print the settings file and data directory locations
    Path,
}

pub async fn run(args: CliArgs) -> AppResult<()> {
    let settings = AppSettings::load().await?;
    let (sink, rx) = ChannelSink::new();
    let state = Arc::new(AppState::initialize(settings, Arc::new(sink))?);
    let printer = tokio::spawn(print_events(rx));

    let result = dispatch(&state, args.command).await;

    // Last sink owner gone: the printer drains and exits
    drop(state);
    if let Err(e) = printer.await {
        warn!("Event printer stopped abnormally: {}", e);
    }
    result
}

async fn dispatch(state: &Arc<AppState>, command: Command) -> AppResult<()> {
    match command {
        Command::Translate { reverse, text } => translate(state, reverse, text).await,
        Command::History { action } => history(state, action.unwrap_or(HistoryAction::List)).await,
        Command::Scripts { action } => scripts(state, action.unwrap_or(ScriptAction::List)).await,
        Command::Config { action } => config(state, action.unwrap_or(ConfigAction::Show)).await,
    }
}

async fn read_stdin() -> AppResult<String> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

async fn translate(state: &Arc<AppState>, reverse: bool, text: String) -> AppResult<()> {
    let text = if text == "-" { read_stdin().await? } else { text };
    let direction = if reverse {
        TranslationDirection::TargetToSource
    } else {
        TranslationDirection::SourceToTarget
    };
    commands::set_direction(state, direction)?;

    let interrupt = {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling translation");
                commands::cancel_translation(&state);
            }
        })
    };

    let outcome = commands::translate_text_stream(state, text).await;
    interrupt.abort();
    let _ = interrupt.await;

    match outcome?.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// "Hindi -> English" style label using the configured language names
fn describe_direction(translation: &TranslationSettings, direction: TranslationDirection) -> String {
    let (from, to) = translation.language_pair(direction);
    format!("{} -> {}", from, to)
}

async fn history(state: &AppState, action: HistoryAction) -> AppResult<()> {
    match action {
        HistoryAction::List => {
            let items = commands::get_translation_history(state);
            if items.is_empty() {
                println!("No translations yet.");
            }
            let translation = state.settings().await.translation;
            for item in items {
                println!(
                    "[{}] {}",
                    format_timestamp(item.timestamp),
                    describe_direction(&translation, item.direction)
                );
                println!("  {}", item.original.trim());
                println!("  -> {}", item.translated.trim());
            }
            Ok(())
        }
        HistoryAction::Clear => {
            commands::clear_translation_history(state)?;
            println!("History cleared.");
            Ok(())
        }
    }
}

async fn scripts(state: &AppState, action: ScriptAction) -> AppResult<()> {
    match action {
        ScriptAction::List => {
            for script in commands::list_scripts(state) {
                println!("{}  {}  {}", script.id, format_timestamp(script.last_modified), script.title);
            }
        }
        ScriptAction::New { title } => {
            let script = commands::create_script(state, title.as_deref().unwrap_or_default())?;
            println!("{}", script.id);
        }
        ScriptAction::Show { id } => {
            let script = commands::get_script(state, &id)?;
            println!("# {}\n\n{}", script.title, script.content);
        }
        ScriptAction::Save { id, file } => {
            let mut script = commands::get_script(state, &id)?;
            script.content = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?,
                None => read_stdin().await?,
            };
            commands::save_script(state, script)?;
        }
        ScriptAction::Rename { id, title } => {
            commands::rename_script(state, &id, &title)?;
        }
        ScriptAction::Delete { id } => {
            commands::delete_script(state, &id)?;
        }
        ScriptAction::Export { id, out } => {
            let path = commands::export_script(state, &id, out).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn config(state: &AppState, action: ConfigAction) -> AppResult<()> {
    match action {
        ConfigAction::Show => {
            let settings = commands::get_settings(state).await?;
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| AppError::Config(format!("Failed to serialize settings: {}", e)))?;
            println!("{}", json);
        }
        ConfigAction::SetKey { key } => {
            let key = match key {
                Some(k) => k,
                None => read_stdin().await?,
            };
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(AppError::Validation("API key must not be empty".to_string()));
            }
            let mut settings = state.settings().await;
            settings.api_keys.gemini_api_key = key;
            commands::update_settings(state, settings).await?;
            println!("API key saved.");
        }
        ConfigAction::Path => {
            println!("settings: {}", AppSettings::get_settings_path()?.display());
            println!("data:     {}", state.settings().await.data_dir()?.display());
        }
    }
    Ok(())
}

/// Streams partial output to stdout; diagnostics go to stderr
async fn print_events(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Partial { chunk, .. } => {
                let _ = write!(stdout, "{}", chunk);
                let _ = stdout.flush();
            }
            PipelineEvent::Completed { .. } => {
                let _ = writeln!(stdout);
            }
            PipelineEvent::Failed { partial, .. } | PipelineEvent::Cancelled { partial, .. } => {
                if !partial.is_empty() {
                    let _ = writeln!(stdout);
                }
            }
            PipelineEvent::PersistenceFailed { error } => {
                eprintln!("Warning: changes were not saved: {}", error);
            }
            PipelineEvent::StateChanged { .. } | PipelineEvent::HistoryUpdated { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_translate_with_reverse() {
        let args = CliArgs::try_parse_from(["scriptdesk", "translate", "--reverse", "hello"]).unwrap();
        match args.command {
            Command::Translate { reverse, text } => {
                assert!(reverse);
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn debug_flag_is_global() {
        let args = CliArgs::try_parse_from(["scriptdesk", "history", "--debug"]).unwrap();
        assert!(args.debug);
        assert!(matches!(args.command, Command::History { action: None }));
    }

    #[test]
    fn script_export_takes_optional_out_dir() {
        let args = CliArgs::try_parse_from(["scriptdesk", "scripts", "export", "abc", "--out", "/tmp/x"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Scripts { action: Some(ScriptAction::Export { ref id, ref out }) }
                if id == "abc" && out.as_deref() == Some(std::path::Path::new("/tmp/x"))
        ));
    }

    #[test]
    fn history_label_uses_configured_languages() {
        let mut translation = TranslationSettings::default();
        translation.target_language = "Marathi".to_string();

        assert_eq!(describe_direction(&translation, TranslationDirection::SourceToTarget), "Hindi -> Marathi");
        assert_eq!(describe_direction(&translation, TranslationDirection::TargetToSource), "Marathi -> Hindi");
    }
}
