use std::{
    io::Read as _,
    path::PathBuf,
    process::{Command, Stdio},
    time::{Duration, Instant, SystemTime},
};

use anyhow::{anyhow, bail, Context as _};
use tracing::{error, info};

use crate::{
    model::{driver::DriverId, node::Node, MapType},
    simulation::snapshot::InputInform,
};

use super::{
    wire::{read_json_from_file, write_dispatch_input, NodeJson, DESTINATION_FILE, PLANNED_ROUTE_FILE},
    DispatchResult, Dispatcher,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dispatch policy running as a separate OS process. Each tick the snapshot
/// is rewritten into the exchange directory, the command is run, and the two
/// output files are read back, guarded by the success flag on stdout and a
/// strict modification-time window.
#[derive(Debug, Clone)]
pub struct ExternalDispatcher {
    command: String,
    exchange_dir: PathBuf,
    timeout: Duration,
    success_flag: String,
}

impl ExternalDispatcher {
    pub fn new(
        command: String,
        exchange_dir: PathBuf,
        timeout: Duration,
        success_flag: String,
    ) -> Self {
        Self {
            command,
            exchange_dir,
            timeout,
            success_flag,
        }
    }

    fn run_subprocess(&self) -> anyhow::Result<String> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.exchange_dir)
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("unable to spawn dispatch process `{}`", self.command))?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() > self.timeout {
                child.kill().ok();
                child.wait().ok();
                bail!(
                    "dispatch process exceeded its runtime bound of {}",
                    humantime::format_duration(self.timeout)
                );
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout).ok();
        }
        if !status.success() {
            error!("dispatch process output: {stdout}");
            bail!("dispatch process exited with {status}");
        }
        Ok(stdout)
    }

    fn check_freshness(&self, invoked_at: SystemTime) -> anyhow::Result<()> {
        let now = SystemTime::now();
        for file in [DESTINATION_FILE, PLANNED_ROUTE_FILE] {
            let path = self.exchange_dir.join(file);
            let modified = std::fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .with_context(|| format!("unable to stat {}", path.display()))?;
            if modified <= invoked_at || modified >= now {
                bail!("output file {} is not the newest", path.display());
            }
        }
        Ok(())
    }
}

impl Dispatcher for ExternalDispatcher {
    fn dispatch(&mut self, input: &InputInform) -> anyhow::Result<DispatchResult> {
        write_dispatch_input(&self.exchange_dir, input)
            .context("unable to write dispatch input files")?;

        let invoked_at = SystemTime::now();
        let started = Instant::now();
        let stdout = self.run_subprocess()?;
        info!(
            "dispatch process finished in {}",
            humantime::format_duration(started.elapsed())
        );
        if !stdout.contains(&self.success_flag) {
            error!("dispatch process output: {stdout}");
            bail!("success flag `{}` is missing from the dispatch output", self.success_flag);
        }
        self.check_freshness(invoked_at)?;

        let destinations: MapType<String, Option<NodeJson>> =
            read_json_from_file(self.exchange_dir.join(DESTINATION_FILE))?;
        let routes: MapType<String, Vec<NodeJson>> =
            read_json_from_file(self.exchange_dir.join(PLANNED_ROUTE_FILE))?;

        let mut driver_id_to_destination: MapType<DriverId, Option<Node>> = MapType::new();
        for (driver_id, node) in destinations {
            let node = node.map(NodeJson::into_node).transpose().map_err(|err| {
                anyhow!("invalid destination node for driver {driver_id}: {err}")
            })?;
            driver_id_to_destination.insert(driver_id.into(), node);
        }
        let mut driver_id_to_planned_route: MapType<DriverId, Vec<Node>> = MapType::new();
        for (driver_id, nodes) in routes {
            let route: Vec<Node> = nodes
                .into_iter()
                .map(NodeJson::into_node)
                .collect::<anyhow::Result<_>>()
                .map_err(|err| anyhow!("invalid planned route for driver {driver_id}: {err}"))?;
            driver_id_to_planned_route.insert(driver_id.into(), route);
        }

        Ok(DispatchResult {
            driver_id_to_destination,
            driver_id_to_planned_route,
        })
    }
}
