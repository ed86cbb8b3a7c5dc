//! 服务器状态
//!
//! ServerState 持有所有服务的共享引用，使用 Arc 实现浅拷贝。

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::Config;
use crate::notify::{NotificationRequest, NotifyWorker};
use crate::orders::{Orchestrator, OrderStorage, PrintSubmissionWorker, RetryPolicy, SubmissionRequest};
use crate::services::{
    HttpMailer, HttpPaymentGateway, HttpPrintPartner, Mailer, PaymentGateway, PrintPartner,
};

/// 提交队列长度。订单量远低于此值；打满说明打印伙伴长时间不可用。
const SUBMISSION_QUEUE_CAPACITY: usize = 256;
/// 通知队列长度。满时直接丢弃（best-effort）。
const NOTIFY_QUEUE_CAPACITY: usize = 1024;

/// 工作者接收端，启动后台任务时一次性取走
struct WorkerChannels {
    submission_rx: mpsc::Receiver<SubmissionRequest>,
    notify_rx: mpsc::Receiver<NotificationRequest>,
}

/// 服务器状态 - 持有所有服务的单例引用
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | storage | OrderStorage | 嵌入式数据库 (redb) |
/// | orchestrator | Arc<Orchestrator> | 订单编排器 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 订单存储
    pub storage: OrderStorage,
    /// 订单编排器
    pub orchestrator: Arc<Orchestrator>,

    print_partner: Arc<dyn PrintPartner>,
    mailer: Arc<dyn Mailer>,
    worker_channels: Arc<Mutex<Option<WorkerChannels>>>,
    background: Arc<tokio::sync::Mutex<Option<BackgroundTasks>>>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 配置校验（缺失 webhook 密钥拒绝启动）
    /// 2. 工作目录与数据库
    /// 3. 外部协作方客户端
    /// 4. 编排器与工作者通道
    pub async fn initialize(config: &Config) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        std::fs::create_dir_all(&config.work_dir)?;
        let storage = OrderStorage::open(config.database_path())?;
        tracing::info!(path = %config.database_path().display(), "Order storage ready");

        let timeout = config.upstream_timeout();
        let payment_gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
            config.payment_gateway_url.clone(),
            config.payment_gateway_key.clone(),
            timeout,
        ));
        let print_partner: Arc<dyn PrintPartner> = Arc::new(HttpPrintPartner::new(
            config.print_partner_url.clone(),
            config.print_partner_key.clone(),
            timeout,
        ));
        let mailer: Arc<dyn Mailer> = Arc::new(HttpMailer::new(
            config.mailer_url.clone(),
            config.mailer_key.clone(),
            config.mail_from.clone(),
            timeout,
        ));

        let (submission_tx, submission_rx) = mpsc::channel(SUBMISSION_QUEUE_CAPACITY);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_QUEUE_CAPACITY);

        let orchestrator = Arc::new(Orchestrator::new(
            storage.clone(),
            payment_gateway,
            submission_tx,
            notify_tx,
        ));

        Ok(Self {
            config: config.clone(),
            storage,
            orchestrator,
            print_partner,
            mailer,
            worker_channels: Arc::new(Mutex::new(Some(WorkerChannels {
                submission_rx,
                notify_rx,
            }))),
            background: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    /// 启动后台任务
    ///
    /// - 打印提交工作者
    /// - 通知工作者
    /// - 恢复扫描（重新入列崩溃前丢失的提交）
    ///
    /// 幂等：重复调用只记录警告。
    pub async fn start_background_tasks(&self) {
        let channels = {
            let mut guard = match self.worker_channels.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        let Some(WorkerChannels {
            submission_rx,
            notify_rx,
        }) = channels
        else {
            tracing::warn!("Background tasks already started");
            return;
        };

        let mut tasks = BackgroundTasks::new();

        let policy = RetryPolicy {
            max_attempts: self.config.submit_max_attempts,
            base_delay: std::time::Duration::from_millis(self.config.submit_base_delay_ms),
            cap: std::time::Duration::from_millis(self.config.submit_delay_cap_ms),
        };
        let submission_worker = PrintSubmissionWorker::new(
            self.orchestrator.clone(),
            self.print_partner.clone(),
            policy,
        );
        let shutdown = tasks.shutdown_token();
        tasks.spawn("submission_worker", TaskKind::Worker, async move {
            submission_worker.run(submission_rx, shutdown).await;
        });

        let notify_worker = NotifyWorker::new(self.mailer.clone(), self.storage.clone());
        let shutdown = tasks.shutdown_token();
        tasks.spawn("notify_worker", TaskKind::Worker, async move {
            notify_worker.run(notify_rx, shutdown).await;
        });

        // The scan runs after the workers so re-enqueued submissions
        // have a consumer.
        let orchestrator = self.orchestrator.clone();
        tasks.spawn("submission_recovery", TaskKind::Warmup, async move {
            match orchestrator.recover_pending_submissions().await {
                Ok(0) => tracing::info!("Recovery scan found no pending submissions"),
                Ok(n) => tracing::info!(count = n, "Recovery scan re-enqueued submissions"),
                Err(e) => tracing::error!(error = %e, "Recovery scan failed"),
            }
        });

        tasks.log_summary();
        *self.background.lock().await = Some(tasks);
    }

    /// 停止后台任务（graceful）
    pub async fn stop_background_tasks(&self) {
        let tasks = self.background.lock().await.take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
    }
}
