use std::path::Path;

use anyhow::{Context, Result, bail};
use resolver::{NoopObserver, ResolveFailure, ResolverSettings, resolve};
use resolver_game::GameData;
use resolver_game::world_reader::{parse_patches, read_world};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScenariosList {
    scenarios: Vec<Scenario>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Expectation {
    Completable,
    Unsatisfiable,
    Timeout,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[serde(default)]
    patches: serde_json::Value,
    #[serde(default)]
    settings: Option<ResolverSettings>,
    expect: Expectation,
    // Node identifiers of the expected collection order
    actions: Option<Vec<String>>,
}

fn test_scenario(game_data: &GameData, scenario: &Scenario) -> Result<()> {
    let patches_json = match &scenario.patches {
        serde_json::Value::Null => "{}".to_string(),
        value => value.to_string(),
    };
    let patches = parse_patches(&patches_json, game_data)?;
    let settings = scenario.settings.clone().unwrap_or_default();
    let result = resolve(game_data, &patches, &settings, &mut NoopObserver);

    match (&scenario.expect, result) {
        (Expectation::Completable, Ok(path)) => {
            if let Some(expected) = &scenario.actions {
                let actual: Vec<&String> = path.actions.iter().map(|a| &a.node).collect();
                let expected: Vec<&String> = expected.iter().collect();
                if actual != expected {
                    bail!("expected actions {:?}, got {:?}", expected, actual);
                }
            }
        }
        (Expectation::Unsatisfiable, Err(ResolveFailure::Unsatisfiable { .. })) => {}
        (Expectation::Timeout, Err(ResolveFailure::Timeout { .. })) => {}
        (expect, Ok(path)) => bail!("expected {:?}, but completable with {:?}", expect, path),
        (expect, Err(err)) => bail!("expected {:?}, got: {}", expect, err),
    }
    Ok(())
}

#[test]
fn test_logic_scenarios() -> Result<()> {
    let data_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    let mut entries: Vec<_> = std::fs::read_dir(&data_path)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        println!("{}", entry.file_name().display());

        let world_path = entry.path().join("world.json");
        let game_data = read_world(&world_path)?;

        let scenarios_path = entry.path().join("scenarios.json");
        let scenarios_str = std::fs::read_to_string(scenarios_path.clone())
            .context(format!("loading {}", scenarios_path.display()))?;
        let scenarios_list: ScenariosList = serde_json::from_str(&scenarios_str)
            .context(format!("parsing {}", scenarios_path.display()))?;
        for scenario in &scenarios_list.scenarios {
            println!("Scenario: {}", scenario.name);
            test_scenario(&game_data, scenario)
                .with_context(|| format!("scenario '{}' in {}", scenario.name, scenarios_path.display()))?;
        }
    }
    Ok(())
}
