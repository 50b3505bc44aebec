use conductor_core::Error;
use conductor_router::{RequestContext, RouteOutcome};
use conductor_workflow::{Approval, Phase, WorkflowRun};
use std::io::{self, Write};

use super::App;

/// Route a request, then drive the resulting run through the approval
/// gate interactively.
pub async fn run(
    request: &str,
    scope: Option<String>,
    capability: Option<String>,
) -> anyhow::Result<()> {
    let app = App::open()?;
    let conductor = app.conductor();

    let mut ctx = RequestContext {
        scope,
        explicit_capability: capability,
        ..Default::default()
    };

    let decision = loop {
        match conductor.route(request, &ctx)? {
            RouteOutcome::Decision(d) => break d,
            RouteOutcome::NeedsClarification {
                question,
                candidates,
                ..
            } => {
                println!("{}", question);
                let answer = prompt(&format!("[{}] > ", candidates.join("/")))?;
                ctx.clarification_round = 1;
                if candidates.iter().any(|c| c == answer.trim()) {
                    ctx.explicit_capability = Some(answer.trim().to_string());
                }
            }
        }
    };

    println!("Decision {} (confidence {:.2})", decision.request_id, decision.confidence);
    println!("  who: {}", decision.who.join(", "));
    if !decision.how.is_empty() {
        println!("  how: {}", decision.how.join(", "));
    }
    println!("  why: {}", decision.why_rationale);
    println!();

    let task_type = conductor.task_type_for(&decision, &ctx);
    let run = conductor
        .start_from_decision(decision.clone(), &task_type, request)
        .await?;
    print_plan(&run);

    loop {
        let answer = prompt("Approve plan? [accept/reject/abort] > ")?;
        let Some(approval) = Approval::parse(answer.trim()) else {
            continue;
        };
        match conductor.advance(&run.request_id, approval).await {
            Ok(updated) => match updated.phase {
                Phase::Complete => {
                    println!("Run complete. Spans:");
                    for id in &updated.span_ids {
                        println!("  {}", id);
                    }
                    println!("Attach feedback with `conductor reward <span_id> <value>`.");
                    return Ok(());
                }
                Phase::AwaitingApproval => {
                    println!("Plan rebuilt.");
                    print_plan(&updated);
                }
                Phase::Rejected => {
                    println!("Run aborted.");
                    return Ok(());
                }
                phase => {
                    println!("Run is now {}.", phase);
                    return Ok(());
                }
            },
            Err(Error::MinimumAgentViolation { required, invoked }) => {
                println!(
                    "Orchestration needs {} distinct agents, {} invoked so far.",
                    required, invoked
                );
                let id = prompt("Additional agent id > ")?;
                conductor
                    .machine()
                    .invoke_additional(&run.request_id, id.trim())
                    .await?;
                let updated = conductor.machine().resume(&run.request_id).await?;
                if updated.phase == Phase::Complete {
                    println!("Run complete with {} agents.", updated.invoked_agents.len());
                }
                return Ok(());
            }
            Err(Error::VerificationExhausted { attempts, findings }) => {
                println!("Run rejected after {} verification attempts:", attempts);
                for f in findings {
                    println!("  - {}", f);
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn print_plan(run: &WorkflowRun) {
    let Some(plan) = &run.plan else {
        return;
    };
    println!("Plan ({} steps):", plan.steps.len());
    for step in &plan.steps {
        println!("  {}. {}", step.index + 1, step.description);
    }
    for note in &plan.notes {
        println!("  note: {}", note);
    }
}

fn prompt(text: &str) -> anyhow::Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}
