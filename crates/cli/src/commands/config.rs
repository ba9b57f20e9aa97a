// Resolved configuration command

use anyhow::Result;
use serde::Serialize;
use taskpool::{PoolConfig, WorkerLimits};

use crate::output::{print_field, OutputFormat};

#[derive(Debug, Serialize)]
struct ResolvedConfig<'a> {
    config: &'a PoolConfig,
    limits: WorkerLimits,
}

pub fn run(config: &PoolConfig, output: OutputFormat) -> Result<()> {
    let limits = config.limits()?;

    if !output.is_text() {
        return output.print_value(&ResolvedConfig { config, limits });
    }

    print_field("Name", &config.name);
    print_field("Init workers", limits.init);
    print_field("Core workers", limits.core);
    print_field("Max workers", limits.max);
    print_field("Queue capacity", config.queue_capacity);
    print_field("Queue backlog rate", config.queue_backlog_rate);
    print_field("Max idle time", format!("{:?}", config.max_idle_time));
    print_field("Submit timeout", format!("{:?}", config.submit_timeout));
    print_field("Err handle timeout", format!("{:?}", config.err_handle_timeout));

    Ok(())
}
