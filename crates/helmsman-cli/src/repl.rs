//! Line-oriented REPL: one stdin line per turn, events rendered as they arrive.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use helmsman_core::agent::confirm::render_prompt;
use helmsman_core::{Orchestrator, PlanningContext, SessionKey, TurnEvent, TurnOutcome, TurnRequest};

pub async fn run(
    orchestrator: Arc<Orchestrator>,
    ctx: PlanningContext,
    session: SessionKey,
    json: bool,
) -> Result<()> {
    println!(
        "helmsman (session '{}', namespace '{}'). Type 'exit' to quit.",
        session, ctx.default_namespace
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let mut events = orchestrator.clone().run_turn(
            TurnRequest::new(session.clone(), text),
            ctx.clone(),
            cancel.clone(),
        );

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        render(&event);
                    }
                }
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    tracing::info!(session = %session, "Turn interrupted");
                    cancel.cancel();
                }
            }
        }
    }
    Ok(())
}

fn render(event: &TurnEvent) {
    match event {
        TurnEvent::TextDelta { delta } => {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        TurnEvent::PlanProposed {
            iteration,
            summary,
            tool_calls,
            ..
        } => {
            if !summary.is_empty() {
                println!("[plan {}] {} ({} call(s))", iteration, summary, tool_calls.len());
            }
        }
        TurnEvent::ToolExecuting { call } => println!("  -> {}", call.describe()),
        TurnEvent::ToolResult { result } => match result.error() {
            Some(error) => println!("  x  {}: {}", result.tool, error),
            None => println!("  ok {}", result.tool),
        },
        TurnEvent::ConfirmationRequired { summary, calls, .. } => {
            println!("{}", render_prompt(summary, calls));
        }
        TurnEvent::Notice { message } => println!("note: {}", message),
        TurnEvent::Cancelled { message } => println!("{}", message),
        TurnEvent::Error { message } => eprintln!("error: {}", message),
        TurnEvent::Finished { outcome } => {
            if *outcome == TurnOutcome::Completed {
                println!();
            }
        }
    }
}
