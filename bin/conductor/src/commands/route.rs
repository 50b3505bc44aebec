use conductor_router::{RequestContext, RouteOutcome};

use super::App;

pub async fn run(
    request: &str,
    scope: Option<String>,
    capability: Option<String>,
    task_type: Option<String>,
) -> anyhow::Result<()> {
    let app = App::open()?;
    let conductor = app.conductor();

    let ctx = RequestContext {
        scope,
        explicit_capability: capability,
        task_type,
        ..Default::default()
    };

    match conductor.route(request, &ctx)? {
        RouteOutcome::Decision(decision) => {
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        RouteOutcome::NeedsClarification {
            request_id,
            question,
            candidates,
        } => {
            println!("Clarification needed ({})", request_id);
            println!("  {}", question);
            println!("  candidates: {}", candidates.join(", "));
        }
    }
    Ok(())
}
