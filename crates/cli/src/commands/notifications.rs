//! Seller notification feed.

use super::{CommandResult, Context};

pub fn list(ctx: &Context) -> CommandResult {
    ctx.require_user()?;
    // Sign-in already refreshed the feed.
    let center = ctx.state.notifications();
    let entries = center.entries();
    ctx.emit(&entries, || {
        for entry in &entries {
            let marker = if entry.read { ' ' } else { '*' };
            println!(
                "{marker} {}  {:<24} {}",
                entry.event.created_at.format("%Y-%m-%d %H:%M"),
                entry.event.id,
                entry.event.message
            );
        }
        println!("{} unread", center.unread_count());
    });
    Ok(())
}

pub async fn read(ctx: &Context, id: &str) -> CommandResult {
    ctx.require_user()?;
    ctx.state.notifications().mark_read(id);
    list(ctx)
}

pub async fn read_all(ctx: &Context) -> CommandResult {
    ctx.require_user()?;
    ctx.state.notifications().mark_all_read();
    list(ctx)
}
