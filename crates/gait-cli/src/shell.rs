//! Interactive composition shell.
//!
//! Plain lines replace the natural-language request; suggestions for its
//! last word print as they arrive. Lines starting with `:` are commands.
//! Generated queries and results print as their pipeline reports them.

use anyhow::Result;
use colored::Colorize;
use gait_compose::{ComposerEvent, ComposerSession, CompositionState, ModelChoice};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

enum ShellControl {
    Continue,
    Exit,
}

const HELP: &str = "\
  <text>          set the request (suggestions follow its last word)
  :gen            generate a query from the request
  :run            execute the current query
  :edit <query>   replace the query text
  :pick <n>       append suggestion n to the request
  :api <url>      select an endpoint
  :model <name>   select a model (OpenAi, Custom)
  :apis           list endpoints
  :show           print the session state
  :help           this help
  :quit           leave";

pub async fn run_shell(session: ComposerSession) -> Result<()> {
    let mut suggestions = session.suggestions();
    let mut offered: Vec<String> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut events = forward_events(&session);

    println!("{}", "GAIT shell".green().bold());
    println!("Type `:help` for commands. Type `:quit` to leave.\n");
    print_selection(&session.snapshot());
    prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match dispatch(&session, line.trim(), &offered) {
                    Ok(ShellControl::Continue) => {}
                    Ok(ShellControl::Exit) => break,
                    Err(e) => eprintln!("{} {e}", "error:".red().bold()),
                }
                prompt()?;
            }
            Some(list) = recv_suggestions(&mut suggestions) => {
                println!();
                for (idx, suggestion) in list.iter().enumerate() {
                    println!("  {} {suggestion}", format!("[{}]", idx + 1).cyan());
                }
                offered = list;
                prompt()?;
            }
            Some(event) = events.recv() => {
                if report_event(&event) {
                    prompt()?;
                }
            }
        }
    }

    session.close();
    Ok(())
}

/// Session events as a channel, so every pipeline outcome is seen even when
/// state updates coalesce between polls.
fn forward_events(session: &ComposerSession) -> mpsc::UnboundedReceiver<ComposerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.on_event(Box::new(move |event| {
        let _ = tx.send(event);
    }));
    rx
}

async fn recv_suggestions(
    rx: &mut Option<tokio::sync::mpsc::UnboundedReceiver<Vec<String>>>,
) -> Option<Vec<String>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn prompt() -> Result<()> {
    print!("{}", "gait> ".cyan().bold());
    io::stdout().flush()?;
    Ok(())
}

/// Print what a pipeline produced. True when anything was printed.
fn report_event(event: &ComposerEvent) -> bool {
    match event {
        ComposerEvent::QueryGenerated { text, .. } => {
            println!("\n{}\n{text}", "query:".green().bold());
        }
        ComposerEvent::GenerationFailed { message, .. } => {
            println!();
            eprintln!("{} {message}", "generation failed:".red().bold());
        }
        ComposerEvent::ResultReady { text, failed, .. } => {
            let label = if *failed {
                "result (error):".red().bold()
            } else {
                "result:".green().bold()
            };
            println!("\n{label}\n{text}");
        }
        _ => return false,
    }
    true
}

fn print_selection(state: &CompositionState) {
    let endpoint = state
        .selected_endpoint
        .as_ref()
        .map(|e| e.label().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!(
        "{} {}   {} {}",
        "endpoint:".cyan().bold(),
        endpoint,
        "model:".cyan().bold(),
        state.selected_model
    );
}

fn dispatch(session: &ComposerSession, line: &str, offered: &[String]) -> Result<ShellControl> {
    if line.is_empty() {
        return Ok(ShellControl::Continue);
    }
    let Some(command) = line.strip_prefix(':') else {
        session.set_natural_language(line);
        return Ok(ShellControl::Continue);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "gen" | "generate" => {
            if session.generate_query()?.is_none() {
                println!("nothing to generate: the request is blank");
            }
        }
        "run" => {
            if session.snapshot().can_execute() {
                session.send_query()?;
            } else {
                println!("nothing to run: the query is empty");
            }
        }
        "edit" => session.set_query_text(arg)?,
        "pick" => {
            let picked = arg
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| offered.get(idx));
            match picked {
                Some(suggestion) => {
                    session.suggestion_selected(suggestion)?;
                    if let Some(text) = session.snapshot().natural_language_text {
                        println!("request: {text}");
                    }
                }
                None => println!("no suggestion `{arg}` (have {})", offered.len()),
            }
        }
        "api" => {
            let endpoint = session.select_endpoint(arg)?;
            println!("endpoint: {} ({})", endpoint.label(), endpoint.url);
        }
        "model" => {
            let model: ModelChoice = arg.parse()?;
            session.select_model(model)?;
            println!("model: {model}");
        }
        "apis" => {
            let selected = session.snapshot().selected_endpoint;
            for endpoint in session.endpoints() {
                let marker = if selected.as_ref() == Some(&endpoint) { "*" } else { " " };
                println!("{marker} {:<24} {}", endpoint.label(), endpoint.url);
            }
        }
        "show" => {
            let state = session.snapshot();
            print_selection(&state);
            println!(
                "{} {}",
                "request:".cyan().bold(),
                state.natural_language_text.as_deref().unwrap_or("")
            );
            println!("{}\n{}", "query:".cyan().bold(), state.generated_query_text);
            if let Some(result) = &state.result_text {
                println!("{}\n{result}", "result:".cyan().bold());
            }
            println!(
                "generating={} executing={} can_execute={}",
                state.is_generating,
                state.is_executing,
                state.can_execute()
            );
        }
        "help" => println!("{HELP}"),
        "quit" | "exit" | "q" => return Ok(ShellControl::Exit),
        other => println!("unknown command `:{other}` (try :help)"),
    }
    Ok(ShellControl::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gait_compose::{MockServices, Services};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_outcomes_arrive_without_watching_state() {
        let session = ComposerSession::new(
            Services::mock(Arc::new(MockServices::bookstore())),
            ModelChoice::default(),
        );
        session.activate().await.unwrap();
        let mut events = forward_events(&session);

        session.set_natural_language("list all books");
        session.generate_query().unwrap();
        session.set_query_text("{ books { title } }").unwrap();
        session.send_query().unwrap();

        let mut generated = None;
        let mut result = None;
        while generated.is_none() || result.is_none() {
            match events.recv().await.unwrap() {
                ComposerEvent::QueryGenerated { text, .. } => generated = Some(text),
                ComposerEvent::ResultReady { failed, .. } => result = Some(failed),
                _ => {}
            }
        }
        assert_eq!(generated.as_deref(), Some("{ books { title } }"));
        assert_eq!(result, Some(false));
    }

    #[test]
    fn test_only_pipeline_outcomes_are_reported() {
        let gate = gait_compose::LatestGate::new();
        let ticket = gate.issue();
        assert!(report_event(&ComposerEvent::GenerationFailed {
            ticket,
            message: "boom".to_string(),
        }));
        assert!(!report_event(&ComposerEvent::Discarded {
            pipeline: gait_compose::Pipeline::Execution,
            ticket,
        }));
    }
}
