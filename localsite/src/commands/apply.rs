use localsite_core::{HostsOutcome, RunResult};

use super::Context;
use crate::cli::TargetArgs;
use crate::config::load_desired_config;
use crate::elevation;
use crate::output;
use crate::provision::{Reconciler, site_url};

pub fn run(target: &TargetArgs, no_elevate: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::resolve(target)?;
    // Config problems are reported before any elevation prompt.
    let desired = load_desired_config(&target.config)?;

    if !no_elevate && !elevation::is_elevated()? {
        if !target.json {
            output::muted("Administrator rights are required to change the site and hosts file.");
        }
        let args: Vec<String> = std::env::args().skip(1).collect();
        let env = [
            (elevation::HOME_ENV, ctx.home.as_path()),
            (elevation::HOSTS_FILE_ENV, ctx.hosts_path.as_path()),
        ];
        let code = elevation::relaunch_elevated(&args, &env)?;
        if code != 0 {
            std::process::exit(code);
        }
        return Ok(());
    }

    if !target.json {
        output::step(&format!(
            "Applying site {} ({} backend)",
            output::emphasized(&desired.site_name),
            ctx.backend
        ));
        if output::is_verbose() {
            output::muted(&format!("Web root: {}", desired.web_root.display()));
            output::muted(&format!("Hosts file: {}", ctx.hosts_path.display()));
            output::muted(&format!("Home: {}", ctx.home.display()));
        }
    }

    let backends = ctx.backends();
    let hosts = ctx.hosts_editor();
    let result = Reconciler::new(
        backends.host.as_ref(),
        backends.store.as_ref(),
        backends.permissions.as_ref(),
        &hosts,
    )
    .with_options(ctx.options.clone())
    .reconcile(&desired)?;

    if target.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &RunResult) {
    if result.app_pool_created {
        output::success(&format!("Created app pool {}", result.app_pool_name));
    } else {
        output::muted(&format!("App pool {} already exists", result.app_pool_name));
    }
    if result.site_recreated {
        output::success(&format!("Rebuilt site {}", result.site_name));
    } else {
        output::success(&format!("Created site {}", result.site_name));
    }

    for binding in &result.bindings {
        let mut line = format!(
            "{}: certificate {} ({})",
            binding.hostname, binding.certificate, binding.thumbprint
        );
        if binding.duplicates_removed > 0 {
            line.push_str(&format!(
                ", {} duplicate(s) removed",
                binding.duplicates_removed
            ));
        }
        if binding.hosts == HostsOutcome::Added {
            line.push_str(", hosts entry added");
        }
        output::success(&line);
    }

    output::section("Site URLs");
    for binding in &result.bindings {
        println!("  {}", site_url(&binding.hostname));
    }
}
