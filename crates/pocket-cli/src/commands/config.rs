//! `pocket-agent config` -- show the effective configuration.

use pocket_types::EffectiveConfig;

pub fn show(effective: &EffectiveConfig) {
    if effective.source_files.is_empty() {
        println!("# no config files found; using defaults and environment");
    } else {
        for path in &effective.source_files {
            println!("# loaded {}", path.display());
        }
    }

    let mut overridden: Vec<(&String, String)> = effective
        .sources
        .iter()
        .filter(|(_, source)| !matches!(source, pocket_types::ConfigSource::BuiltinDefault))
        .map(|(key, source)| (key, source.to_string()))
        .collect();
    overridden.sort();
    for (key, source) in overridden {
        println!("# {key} <- {source}");
    }

    println!();
    print!("{}", effective.render_masked());
}
