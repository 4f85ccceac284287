//! Outbox inspection.

use super::{CommandResult, Context};

pub fn show(ctx: &Context) -> CommandResult {
    let pending = ctx.state.outbox().pending();
    ctx.emit(&pending, || {
        if pending.is_empty() {
            println!("No pending cart writes");
        }
        for entry in &pending {
            println!(
                "{}  {:<32} attempts={} next={}{}",
                entry.id,
                entry.mutation.to_string(),
                entry.attempts,
                entry.next_attempt_at.format("%H:%M:%S"),
                entry
                    .last_error
                    .as_deref()
                    .map(|e| format!(" error={e}"))
                    .unwrap_or_default()
            );
        }
    });
    Ok(())
}

pub async fn flush(ctx: &Context) -> CommandResult {
    ctx.state.outbox().retry_now();
    let report = ctx.state.sync_now().await;
    ctx.emit(&report, || {
        println!(
            "Delivered {}, abandoned {}, remaining {}",
            report.delivered.len(),
            report.abandoned.len(),
            report.remaining
        );
        if let Some((id, error)) = &report.failed {
            println!("Blocked on {id}: {error}");
        }
    });
    Ok(())
}
