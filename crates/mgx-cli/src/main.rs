//! 🚀 mgx-cli — the front door, the bouncer, the maitre d' of mergex.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Resolve the config path (argv[1], or the ol' reliable `mgx.toml`)
/// 3. Load config (the moment of truth)
/// 4. Run the merge (send it and pray 🙏)
/// 5. Print the summary table, or the error onion — whichever we earned
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let path_arg = args.get(1).map(String::as_str).unwrap_or("mgx.toml");

    // 🔒 validate the config file exists before we get too emotionally attached.
    // Absent file is fine — env vars might carry the whole config on their back.
    let config_file = std::path::Path::new(path_arg);
    let config_file_if_it_exists = match config_file.try_exists().context(format!(
        "💀 Couldn't even CHECK whether the config file exists. Was looking here: \
         '{}'. If that's a relative path, consider an absolute one, to be \
         absolutely certain.",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => None,
    };

    let app_config = mgx::app_config::load_config(config_file_if_it_exists).context(
        "💀 In mgx-cli, main: the config didn't load. Check the TOML, check the \
         MGX_* env vars, check that you didn't forget something obvious.",
    )?;

    // 🚀 SEND IT. Two passes over the bucket, no take-backs.
    match mgx::run(app_config).await {
        Ok(report) => {
            // 🍽️ the part everyone actually reads
            println!("{}", mgx::progress::summary_table(&report));
            if !report.groups_failed.is_empty() {
                // ⚠️ the run finished, but not everything shipped. Exit code
                // stays 0 — best-effort uploads are reported, not fatal —
                // the table above names the groups to re-run.
                error!(
                    "⚠️ {} group(s) exhausted their upload retries: {}",
                    report.groups_failed.len(),
                    report.groups_failed.join(", ")
                );
            }
            Ok(())
        }
        Err(err) => {
            // 💀 error handling: the part where we find out what went wrong
            // and print it in a way that's helpful at 3am
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut the_vibes_are_giving_credential_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                // -- 🕵️ sniff the cause like a truffle pig hunting for auth problems
                let cause_str = cause.to_string();
                if cause_str.contains("dispatch failure")
                    || cause_str.contains("no credentials")
                    || cause_str.contains("NoCredentials")
                    || cause_str.contains("credentials")
                    || cause_str.contains("AccessDenied")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_credential_issues = true;
                }
            }

            // -- 📡 if it smells like an auth problem, it's probably an auth problem
            if the_vibes_are_giving_credential_issues {
                error!(
                    "🔧 hint: looks like AWS couldn't be reached or wouldn't talk to us. \
                    Double-check your credential chain (env vars, ~/.aws/config, IAM \
                    role), the region, and the bucket names. `aws sts get-caller-identity` \
                    is the classic 'is it me or is it them' test. ☕"
                );
            }

            // 🗑️ exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}
