//! Profile commands.

use komorebi_core::ProfileUpdate;

use super::{CommandResult, Context};

pub async fn show_or_update(
    ctx: &Context,
    display_name: Option<String>,
    bio: Option<String>,
) -> CommandResult {
    let user = ctx.require_user()?;
    let update = ProfileUpdate {
        display_name,
        bio,
        ..Default::default()
    };

    let profile = if update.is_empty() {
        ctx.state.profile(&user.user_id).await?
    } else {
        ctx.state.update_profile(&update).await?
    };

    ctx.emit(&profile, || {
        println!("{} <{}>", profile.display_name, user.email);
        if let Some(bio) = &profile.bio {
            println!("  {bio}");
        }
    });
    Ok(())
}
