use std::{env, fs, io, path::Path};

use log::{info, warn};
use machine_learning::{Example, ModelType};
use tasks::{
    Config, Dispatcher, ModelAccess, ModelRegistry, OwnerId, Task, TaskKind, TaskOutcome,
};

const OWNER: OwnerId = OwnerId(0);
const NODE_ID: &str = "node";

const USAGE: &str = "usage:
    node train <data_path> <type> <examples.json>
    node run <data_path> <type> <v1,v2,...>
    node series <data_path> <type> <series.json>";

fn main() -> io::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [command, data_path, model_type, arg] = args.as_slice() else {
        return Err(invalid(USAGE));
    };

    let model_type: ModelType = model_type.parse().map_err(invalid)?;
    let config = Config::from_env()?;
    let mut registry = ModelRegistry::from_config(&config.registry);
    let mut dispatcher = config.dispatch.dispatcher()?;

    let access = registry.get_model(OWNER, data_path, model_type, NODE_ID)?;
    info!(
        data_path = data_path.as_str(),
        model_type:% = model_type,
        trained = access.is_trained;
        "model resolved"
    );

    let task = match command.as_str() {
        "train" => Task::training(&access.model, read_json::<Vec<Example>>(arg)?)?,
        "run" => Task::sampling(&access.model, parse_inputs(arg)?)?.with_context(&access.context),
        "series" => Task::series(&access.model, read_json::<Vec<Vec<f32>>>(arg)?)?
            .with_context(&access.context),
        _ => return Err(invalid(USAGE)),
    };

    dispatcher.submit(task)?;
    for outcome in dispatcher.drain() {
        report(&registry, &access, &outcome)?;
    }

    Ok(())
}

/// Prints the outcome of a task and persists the model after a successful training.
fn report(registry: &ModelRegistry, access: &ModelAccess, outcome: &TaskOutcome) -> io::Result<()> {
    if let Some(failure) = &outcome.failure {
        warn!(task_id = outcome.task_id; "{failure}");
        return Err(invalid(failure));
    }

    if outcome.kind == TaskKind::Train {
        let path = registry.save(&access.model)?;
        println!("trained, saved to {}", path.display());
        return Ok(());
    }

    for output in &outcome.outputs {
        let line: Vec<String> = output.iter().map(f32::to_string).collect();
        println!("{}", line.join(","));
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<T> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(io::Error::from)
}

fn parse_inputs(arg: &str) -> io::Result<Vec<f32>> {
    arg.split(',')
        .map(|v| v.trim().parse::<f32>().map_err(invalid))
        .collect()
}

fn invalid(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
}
