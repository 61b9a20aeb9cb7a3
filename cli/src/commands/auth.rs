use anyhow::Result;

use crate::config::{Config, Session};
use crate::remote_client::HttpRemote;

use super::helpers::require_non_empty;

pub(crate) fn cmd_login(
    config: &Config,
    server: &str,
    user_id: &str,
    api_key: Option<String>,
    json: bool,
) -> Result<()> {
    require_non_empty(user_id, "User id")?;
    // Validates the URL before anything is stored.
    HttpRemote::new(server, None, config.timeout)?;

    let session = Session {
        server: server.trim_end_matches('/').to_string(),
        user_id: user_id.trim().to_string(),
        api_key: api_key.filter(|k| !k.trim().is_empty()),
    };
    config.save_session(&session)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "user_id": session.user_id, "server": session.server })
        );
    } else {
        println!("Signed in as {} on {}", session.user_id, session.server);
    }
    Ok(())
}

pub(crate) fn cmd_logout(config: &Config, json: bool) -> Result<()> {
    let existed = config.clear_session()?;
    if json {
        println!("{}", serde_json::json!({ "signed_out": existed }));
    } else if existed {
        println!("Signed out. Logs will be kept on this device only.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(config: &Config, json: bool) -> Result<()> {
    let session = config.session()?;
    if json {
        let value = match &session {
            Some(s) => serde_json::json!({
                "signed_in": true,
                "user_id": s.user_id,
                "server": s.server,
            }),
            None => serde_json::json!({ "signed_in": false }),
        };
        println!("{value}");
        return Ok(());
    }
    match session {
        Some(s) => println!("{} on {}", s.user_id, s.server),
        None => println!("Not signed in. Logs are stored at {}", config.cache_path.display()),
    }
    Ok(())
}
