//! Composition root
//!
//! Wires the queues, workers, router, cache and RPC server from the loaded
//! settings.

use crate::config::Settings;
use crate::handlers::{DaemonTaskHandlers, IntegrationSwitch, JobInventory, JobList};
use anyhow::{Context, Result};
use conduit_api_rpc::{RpcDeps, RpcServer, RpcServerConfig, StartedServer};
use conduit_core::application::push::{
    builtin_descriptor, ANALYSIS_QUEUE, COVERAGE_QUEUE, TASK_QUEUE, TASK_RESULT_QUEUE,
};
use conduit_core::application::{
    EnabledFlag, InMemoryRootTracker, ItemHandler, PushService, QueueRegistry, QueueResultSink,
    QueueWorker, Reachability, ReadinessGate, RefreshableCache, TaskQueueHandler, TaskRouter,
    WorkerSupervisor,
};
use conduit_core::domain::{PersistenceMode, QueueName, TaskEnvelope};
use conduit_core::port::time_provider::SystemTimeProvider;
use conduit_core::port::{DurableQueue, Precondition, TimeProvider};
use conduit_infra_sqlite::{create_file_pool, run_migrations, SqliteQueueFactory};
use conduit_infra_system::{CommandHandler, CommandSpec, TcpReachability};
use serde_json::Value;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A running daemon
pub struct Daemon {
    supervisor: WorkerSupervisor,
    rpc: StartedServer,
    pool: SqlitePool,
    grace: Duration,
}

impl Daemon {
    pub async fn start(settings: &Settings) -> Result<Self> {
        // 1. Database
        if let Some(dir) = settings.db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        }
        info!(db_path = %settings.db_path.display(), "Opening queue database...");
        let pool = create_file_pool(&settings.db_path)
            .await
            .context("DB pool creation failed")?;
        run_migrations(&pool).await.context("Migration failed")?;

        // 2. Queues
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let registry = Arc::new(QueueRegistry::new(
            Arc::new(SqliteQueueFactory::new(pool.clone())),
            time_provider.clone(),
        ));
        for name in [COVERAGE_QUEUE, ANALYSIS_QUEUE, TASK_QUEUE] {
            let mode = if settings.queue(name).durable {
                PersistenceMode::Durable
            } else {
                PersistenceMode::Transient
            };
            registry.open(builtin_descriptor(name, mode)?).await?;
        }
        registry
            .open(builtin_descriptor(TASK_RESULT_QUEUE, PersistenceMode::Transient)?)
            .await?;

        // 3. Readiness
        let integration = Arc::new(EnabledFlag::new(settings.integration.enabled));
        let reachability = Arc::new(Reachability::new());
        let gate = Arc::new(ReadinessGate::new(vec![
            integration.clone() as Arc<dyn Precondition>,
            reachability.clone() as Arc<dyn Precondition>,
        ]));

        // 4. Router with the cached job inventory
        let inventory = JobInventory::new(settings.inventory.jobs_file.clone());
        let jobs: Arc<RefreshableCache<JobList>> = Arc::new(RefreshableCache::new(
            move || {
                let inventory = inventory.clone();
                async move { inventory.load().await }
            },
            settings.cache_config(),
            time_provider.clone(),
        ));
        let switch =
            IntegrationSwitch::new(integration.clone(), jobs.clone(), settings.cache.enabled);
        switch.set(settings.integration.enabled);

        let handlers = Arc::new(DaemonTaskHandlers::new(
            settings.service_id.clone(),
            registry.clone(),
            switch.clone(),
            reachability.clone(),
            jobs.clone(),
        ));
        let router = Arc::new(TaskRouter::new(
            settings.router_config(),
            handlers,
            Arc::new(InMemoryRootTracker::new()),
        ));

        // 5. Workers
        let mut supervisor = WorkerSupervisor::new();
        let worker_config = settings.worker_config();
        for name in [COVERAGE_QUEUE, ANALYSIS_QUEUE] {
            let queue_settings = settings.queue(name);
            let Some(program) = queue_settings.command else {
                info!(queue = name, "No command configured, items stay queued");
                continue;
            };
            let spec = CommandSpec::new(program, Duration::from_secs(queue_settings.timeout_secs))
                .with_args(queue_settings.args);
            let handler: Arc<dyn ItemHandler<Value>> = Arc::new(CommandHandler::new(spec));
            let worker = QueueWorker::new(
                queue_name(name)?,
                open(&registry, name)?,
                gate.clone(),
                handler,
            )
            .with_config(worker_config)
            .with_time_provider(time_provider.clone());
            supervisor.spawn(worker)?;
        }

        // Routing is local, so queued tasks do not wait for the Server
        let sink = Arc::new(QueueResultSink::new(
            registry.clone(),
            queue_name(TASK_RESULT_QUEUE)?,
        ));
        let task_handler: Arc<dyn ItemHandler<TaskEnvelope>> =
            Arc::new(TaskQueueHandler::new(router.clone(), sink.clone()));
        let task_worker = QueueWorker::new(
            queue_name(TASK_QUEUE)?,
            open(&registry, TASK_QUEUE)?,
            Arc::new(ReadinessGate::always_open()),
            task_handler,
        )
        .with_config(worker_config)
        .with_time_provider(time_provider.clone());
        supervisor.spawn(task_worker)?;

        // 6. Reachability probe
        if let Some(addr) = &settings.integration.server_addr {
            let probe = Arc::new(TcpReachability::new(addr.clone()));
            tokio::spawn(reachability.clone().run_probe_loop(
                probe,
                settings.probe_interval(),
                supervisor.shutdown_token(),
            ));
        }

        // 7. JSON-RPC server
        let deps = RpcDeps {
            router,
            push: Arc::new(PushService::new(registry.clone())?),
            results: sink,
            registry,
            gate,
            integration,
            workers: supervisor.monitors(),
            on_toggle: Some(switch.hook()),
        };
        let rpc_config = RpcServerConfig {
            host: settings.rpc.host.clone(),
            port: settings.rpc.port,
            rate_limit_burst: settings.rpc.rate_limit_burst,
            rate_limit_rate: settings.rpc.rate_limit_rate,
        };
        let rpc = RpcServer::new(rpc_config, deps)
            .start()
            .await
            .context("RPC server start failed")?;

        info!(workers = supervisor.len(), rpc_addr = %rpc.local_addr, "Daemon started");
        Ok(Self {
            supervisor,
            rpc,
            pool,
            grace: settings.shutdown_grace(),
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc.local_addr
    }

    /// Stop accepting calls, stop the workers, close the database
    pub async fn shutdown(self) -> Result<()> {
        self.rpc
            .handle
            .stop()
            .context("RPC server stop failed")?;
        self.supervisor.shutdown(self.grace).await;
        self.rpc.handle.stopped().await;
        self.pool.close().await;
        info!("Shutdown complete.");
        Ok(())
    }
}

fn queue_name(name: &str) -> Result<QueueName> {
    Ok(QueueName::new(name)?)
}

fn open(registry: &QueueRegistry, name: &str) -> Result<Arc<dyn DurableQueue>> {
    registry
        .get(&queue_name(name)?)
        .with_context(|| format!("Queue {} is not open", name))
}
