//! # Local Cluster
//!
//! A whole cluster inside one OS process: rank 0 stays with the caller as the
//! master, every other rank runs its [`WorkerLoop`] on a dedicated thread.
//! Ranks talk over a [`LocalFabric`].

use std::sync::Arc;
use std::thread::JoinHandle;

use meridian_core::{ModuleLoader, ObjectFactory};

use crate::config::ClusterConfig;
use crate::context::ClusterContext;
use crate::dispatch::{MasterDispatcher, WorkerLoop};
use crate::error::{ClusterError, ClusterResult};
use crate::group::{Communicator, LocalFabric};
use crate::work::WorkTypeRegistry;

/// A running in-process cluster.
#[derive(Debug)]
pub struct LocalCluster {
    master: Option<MasterDispatcher>,
    workers: Vec<JoinHandle<ClusterResult<ClusterContext>>>,
}

impl LocalCluster {
    /// Spawns every rank and selects the configured load balancer.
    ///
    /// Ranks share the process, so finalizing never exits it.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `Io` if a thread cannot be
    /// spawned.
    pub fn start(
        mut config: ClusterConfig,
        factory: Arc<dyn ObjectFactory>,
        modules: Arc<dyn ModuleLoader>,
    ) -> ClusterResult<Self> {
        config.exit_on_finalize = false;
        config.validate()?;

        let registry = Arc::new(WorkTypeRegistry::with_defaults()?);
        let mut endpoints = LocalFabric::spawn(config.world_size).into_iter();
        let master_endpoint = endpoints
            .next()
            .ok_or_else(|| ClusterError::Config(String::from("fabric has no ranks")))?;

        let mut workers = Vec::with_capacity(config.world_size - 1);
        for endpoint in endpoints {
            let rank = endpoint.rank();
            let ctx = ClusterContext::new(
                config.clone(),
                Arc::new(endpoint),
                Arc::clone(&factory),
                Arc::clone(&modules),
            )?;
            let worker = WorkerLoop::new(ctx, Arc::clone(&registry));
            let handle = std::thread::Builder::new()
                .name(format!("meridian-rank-{rank}"))
                .spawn(move || worker.run())?;
            workers.push(handle);
        }

        let master_ctx = ClusterContext::new(config.clone(), Arc::new(master_endpoint), factory, modules)?;
        let mut master = MasterDispatcher::new(master_ctx)?;
        master.set_load_balancer(config.dynamic_load_balancer, config.tiles_preallocated)?;

        tracing::info!(world_size = config.world_size, "local cluster started");
        Ok(Self {
            master: Some(master),
            workers,
        })
    }

    /// The master's dispatcher.
    ///
    /// # Errors
    ///
    /// `Substrate` once the cluster has been shut down.
    pub fn master(&mut self) -> ClusterResult<&mut MasterDispatcher> {
        self.master
            .as_mut()
            .ok_or_else(|| ClusterError::Substrate(String::from("cluster already shut down")))
    }

    /// Finalizes every rank and returns their contexts, master first.
    ///
    /// # Errors
    ///
    /// The first worker failure in rank order, otherwise the master's
    /// finalize failure.
    pub fn shutdown(mut self) -> ClusterResult<(ClusterContext, Vec<ClusterContext>)> {
        let master = self
            .master
            .take()
            .ok_or_else(|| ClusterError::Substrate(String::from("cluster already shut down")))?;
        // On failure the master's endpoint is dropped here, which unblocks
        // any worker still waiting for commands.
        let finalized = master.finalize();

        let mut worker_ctxs = Vec::with_capacity(self.workers.len());
        let mut first_error = None;
        for (index, handle) in std::mem::take(&mut self.workers).into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(ctx)) => worker_ctxs.push(ctx),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(ClusterError::Substrate(format!("rank {} panicked", index + 1)));
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let master_ctx = finalized?;
        tracing::info!("local cluster shut down");
        Ok((master_ctx, worker_ctxs))
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        if let Some(master) = self.master.take() {
            if let Err(err) = master.finalize() {
                tracing::warn!(%err, "finalize during drop failed");
            }
        }
        for handle in self.workers.drain(..) {
            if let Ok(Err(err)) = handle.join() {
                tracing::warn!(%err, "worker ended with an error");
            }
        }
    }
}
