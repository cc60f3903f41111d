//! `sonata build` action

use std::io::IsTerminal;

use anyhow::{bail, Context, Result};

use crate::cli::BuildArgs;
use sonata::ops::build;
use sonata::resolver::ResolveError;
use sonata::util::{Config, GlobalContext};

pub fn execute(ctx: &GlobalContext, args: &BuildArgs, color: bool) -> Result<()> {
    // Load configuration, then let the command line override it
    let mut config = Config::load_or_default(&ctx.config_path())?;
    apply_args(&mut config, args)?;

    let report = build(ctx, &config)?;

    if let Some(path) = &report.logbook {
        eprintln!("     Logbook {}", path.display());
    }
    if report.success {
        eprintln!(
            "    Finished in {:.2}s",
            report.duration.as_secs_f64()
        );
        return Ok(());
    }

    if let Some(error) = &report.error {
        if let Some(resolve) = error.downcast_ref::<ResolveError>() {
            let color = color && std::io::stderr().is_terminal();
            eprintln!("{}", resolve.to_diagnostic().format(color));
        }
    }
    for error in &report.errors {
        eprintln!("  {}", error);
    }
    bail!("build failed with {} error(s)", report.errors.len())
}

/// Merge command line options into the loaded configuration.
fn apply_args(config: &mut Config, args: &BuildArgs) -> Result<()> {
    if let Some(name) = &args.project_name {
        config.project.name = Some(name.clone());
    }
    if let Some(version) = &args.project_version {
        config.project.version = Some(version.clone());
    }
    config
        .project
        .requires
        .extend(args.project_requires.iter().cloned());
    if let Some(release) = args.main_release {
        config.main.release = Some(release);
    }

    config.tools.limit.extend(args.limit_tools.iter().cloned());
    config.tools.skip.extend(args.skip_tools.iter().cloned());
    for tweak in &args.tweak {
        let (tool, arg) = split_pair(tweak, "--tweak")?;
        config.tools.tweaks.entry(tool).or_default().push(arg);
    }

    for location in &args.module_location {
        let (module, uri) = split_pair(location, "--module-location")?;
        config.externals.locations.insert(module, uri);
    }
    for library in &args.library {
        let (name, version) = split_pair(library, "--library")?;
        config.externals.libraries.insert(name, version);
    }

    config.build.lenient |= args.lenient;
    config.build.jar_with_sources |= args.jar_with_sources;
    config.build.offline |= args.offline;
    Ok(())
}

fn split_pair(value: &str, option: &str) -> Result<(String, String)> {
    let (key, rest) = value
        .split_once('=')
        .with_context(|| format!("{} expects KEY=VALUE, got `{}`", option, value))?;
    if key.is_empty() {
        bail!("{} expects KEY=VALUE, got `{}`", option, value);
    }
    Ok((key.to_string(), rest.to_string()))
}
