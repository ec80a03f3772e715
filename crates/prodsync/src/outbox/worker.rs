//! 发件箱 worker - 轮询台账并独立驱动三个目标的投递

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::select;
use tokio::sync::{Notify, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ProdSyncError, Result};
use crate::ledger::ChangeLedger;
use crate::outbox::ErpPushClient;
use crate::storage::entities::SyncTarget;

/// 发件箱 worker 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 每目标每轮拉取的记录数
    pub batch_size: usize,
    /// 单次推送超时时间（秒），慢目标不能拖住其他目标的轮询
    pub push_timeout_seconds: u64,
    /// 同一记录两次尝试之间的最小间隔（秒），作粗粒度退避
    pub attempt_backoff_seconds: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 50,
            push_timeout_seconds: 10,
            attempt_backoff_seconds: 30,
        }
    }
}

/// 投递统计信息
#[derive(Debug, Clone, Default)]
pub struct OutboxMetrics {
    pub poll_pass_total: u64,
    pub push_attempt_total: u64,
    pub push_success_total: u64,
    pub push_failure_total: u64,
    pub push_timeout_total: u64,
}

impl OutboxMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.push_attempt_total == 0 {
            0.0
        } else {
            self.push_success_total as f64 / self.push_attempt_total as f64
        }
    }
}

/// 发件箱 worker 运行器
///
/// 三个目标逐个独立处理，互相之间没有任何投递顺序保证。投递失败只是
/// 留在 Pending，不向任何调用方抛错。
#[derive(Clone)]
pub struct OutboxWorker {
    config: OutboxConfig,
    ledger: ChangeLedger,
    clients: HashMap<SyncTarget, Arc<dyn ErpPushClient>>,

    // 统计信息
    metrics: Arc<RwLock<OutboxMetrics>>,

    // 控制信号
    shutdown_signal: Arc<Notify>,
    is_running: Arc<RwLock<bool>>,
}

impl OutboxWorker {
    pub fn new(
        config: OutboxConfig,
        ledger: ChangeLedger,
        clients: HashMap<SyncTarget, Arc<dyn ErpPushClient>>,
    ) -> Self {
        Self {
            config,
            ledger,
            clients,
            metrics: Arc::new(RwLock::new(OutboxMetrics::default())),
            shutdown_signal: Arc::new(Notify::new()),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// 启动轮询循环
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Err(ProdSyncError::Other("Worker already running".to_string()));
            }
            *running = true;
        }

        info!(
            "Starting outbox worker (poll interval {}ms, batch {})",
            self.config.poll_interval_ms, self.config.batch_size
        );

        let worker = self.clone();
        tokio::spawn(async move {
            info!("Outbox worker started");

            loop {
                select! {
                    _ = worker.shutdown_signal.notified() => {
                        info!("Outbox worker received shutdown signal");
                        break;
                    }
                    _ = sleep(Duration::from_millis(worker.config.poll_interval_ms)) => {
                        if !*worker.is_running.read().await {
                            break;
                        }

                        match worker.poll_once().await {
                            Ok(delivered) if delivered > 0 => {
                                debug!("Poll pass delivered {} record/target pairs", delivered);
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!("Outbox poll pass failed: {}", e);
                            }
                        }
                    }
                }
            }

            info!("Outbox worker stopped");
        });

        Ok(())
    }

    /// 停止轮询循环
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping outbox worker");

        {
            let mut running = self.is_running.write().await;
            *running = false;
        }

        self.shutdown_signal.notify_waiters();

        // 等待一段时间让轮询任务优雅退出
        sleep(Duration::from_millis(200)).await;

        Ok(())
    }

    /// 执行一轮轮询，返回本轮完成投递的 (记录, 目标) 对数
    ///
    /// 公开出来便于测试与手工驱动。每个触碰过的记录在本轮结束时统一
    /// `mark_attempted` 一次（按记录，不按目标），用来全局限流卡住的记录。
    pub async fn poll_once(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now - (self.config.attempt_backoff_seconds as i64) * 1000;

        let mut attempted: HashSet<i64> = HashSet::new();
        let mut delivered_pairs = 0usize;

        for target in SyncTarget::ALL {
            let Some(client) = self.clients.get(&target) else {
                warn!("No push client registered for {:?}, skipping", target);
                continue;
            };

            let records =
                self.ledger
                    .pending_for_target(target, Some(cutoff), self.config.batch_size)?;

            for record in records {
                let Some(record_id) = record.id else { continue };
                attempted.insert(record_id);

                {
                    let mut m = self.metrics.write().await;
                    m.push_attempt_total += 1;
                }

                let push = timeout(
                    Duration::from_secs(self.config.push_timeout_seconds),
                    client.push(&record),
                )
                .await;

                match push {
                    Ok(Ok(())) => {
                        let delivered_at = chrono::Utc::now().timestamp_millis();
                        if self.ledger.mark_delivered(record_id, target, delivered_at)? {
                            debug!("Delivered change record {} to {:?}", record_id, target);
                            delivered_pairs += 1;
                        } else {
                            // 并发 worker 抢先完成了投递，按 no-op 跳过
                            debug!(
                                "Record {} already delivered to {:?}, skipping",
                                record_id, target
                            );
                        }
                        let mut m = self.metrics.write().await;
                        m.push_success_total += 1;
                    }
                    Ok(Err(e)) => {
                        // 失败不落任何状态，记录留在 Pending 等下一轮
                        warn!("Push to {:?} failed for record {}: {}", target, record_id, e);
                        let mut m = self.metrics.write().await;
                        m.push_failure_total += 1;
                    }
                    Err(_) => {
                        // 超时与失败同等对待
                        warn!("Push to {:?} timed out for record {}", target, record_id);
                        let mut m = self.metrics.write().await;
                        m.push_failure_total += 1;
                        m.push_timeout_total += 1;
                    }
                }
            }
        }

        let attempt_at = chrono::Utc::now().timestamp_millis();
        for record_id in attempted {
            self.ledger.mark_attempted(record_id, attempt_at)?;
        }

        {
            let mut m = self.metrics.write().await;
            m.poll_pass_total += 1;
        }

        Ok(delivered_pairs)
    }

    /// 获取统计信息
    pub async fn metrics(&self) -> OutboxMetrics {
        self.metrics.read().await.clone()
    }

    /// 清除统计信息
    pub async fn clear_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = OutboxMetrics::default();
    }

    /// 检查是否正在运行
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::FieldChange;
    use crate::registry::FieldValue;
    use crate::storage::entities::ChangeRecord;
    use std::sync::atomic::{AtomicBool, Ordering};
    use parking_lot::Mutex as SyncMutex;

    /// 脚本化 mock 客户端：可切换成败、记录推送过的记录 id、可注入延迟
    struct MockErpClient {
        fail: AtomicBool,
        delay_ms: u64,
        pushed: SyncMutex<Vec<i64>>,
    }

    impl MockErpClient {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                delay_ms: 0,
                pushed: SyncMutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(true),
                delay_ms: 0,
                pushed: SyncMutex::new(Vec::new()),
            })
        }

        fn slow(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                delay_ms,
                pushed: SyncMutex::new(Vec::new()),
            })
        }

        fn pushed_ids(&self) -> Vec<i64> {
            self.pushed.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl ErpPushClient for MockErpClient {
        async fn push(&self, record: &ChangeRecord) -> Result<()> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProdSyncError::Transport("mock push failed".to_string()));
            }
            self.pushed.lock().push(record.id.unwrap_or(0));
            Ok(())
        }
    }

    fn test_ledger_with_record() -> (ChangeLedger, i64) {
        let ledger = ChangeLedger::open_in_memory().unwrap();
        let id = ledger
            .record(
                1,
                vec![FieldChange {
                    field: "code".into(),
                    old: FieldValue::Text("A1".into()),
                    new: FieldValue::Text("A2".into()),
                }],
            )
            .unwrap();
        (ledger, id)
    }

    fn worker_with_clients(
        ledger: ChangeLedger,
        erp1: Arc<MockErpClient>,
        erp2: Arc<MockErpClient>,
        erp3: Arc<MockErpClient>,
    ) -> OutboxWorker {
        let mut clients: HashMap<SyncTarget, Arc<dyn ErpPushClient>> = HashMap::new();
        clients.insert(SyncTarget::Erp1, erp1);
        clients.insert(SyncTarget::Erp2, erp2);
        clients.insert(SyncTarget::Erp3, erp3);

        let config = OutboxConfig {
            poll_interval_ms: 10,
            batch_size: 10,
            push_timeout_seconds: 1,
            attempt_backoff_seconds: 0,
        };
        OutboxWorker::new(config, ledger, clients)
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let (ledger, _) = test_ledger_with_record();
        let worker = worker_with_clients(
            ledger,
            MockErpClient::ok(),
            MockErpClient::ok(),
            MockErpClient::ok(),
        );

        worker.start().await.unwrap();
        assert!(worker.is_running().await);
        assert!(worker.start().await.is_err());

        worker.stop().await.unwrap();
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_successful_pass_delivers_all_targets() {
        let (ledger, id) = test_ledger_with_record();
        let erp1 = MockErpClient::ok();
        let erp2 = MockErpClient::ok();
        let erp3 = MockErpClient::ok();
        let worker = worker_with_clients(ledger.clone(), erp1.clone(), erp2.clone(), erp3.clone());

        let delivered = worker.poll_once().await.unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(erp1.pushed_ids(), vec![id]);
        assert_eq!(erp2.pushed_ids(), vec![id]);
        assert_eq!(erp3.pushed_ids(), vec![id]);

        let record = ledger.get(id).unwrap().unwrap();
        assert!(record.delivery.fully_delivered());
        assert!(record.last_delivery_attempt_at.is_some());

        let metrics = worker.metrics().await;
        assert_eq!(metrics.push_attempt_total, 3);
        assert_eq!(metrics.push_success_total, 3);
        assert_eq!(metrics.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_scenario_c_targets_progress_independently() {
        // erp1 成功、erp2 失败：erp1 的槽翻转，erp2 原样留在待投递集合
        let (ledger, id) = test_ledger_with_record();
        let erp1 = MockErpClient::ok();
        let erp2 = MockErpClient::failing();
        let erp3 = MockErpClient::failing();
        let worker = worker_with_clients(ledger.clone(), erp1.clone(), erp2, erp3);

        let delivered = worker.poll_once().await.unwrap();
        assert_eq!(delivered, 1);

        // erp1 不再返回该记录，erp2 仍然返回
        assert!(ledger
            .pending_for_target(SyncTarget::Erp1, None, 10)
            .unwrap()
            .is_empty());
        let pending = ledger.pending_for_target(SyncTarget::Erp2, None, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, Some(id));

        // 下一轮 erp1 不会被重复推送
        sleep(Duration::from_millis(5)).await;
        worker.poll_once().await.unwrap();
        assert_eq!(erp1.pushed_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_scenario_d_failure_keeps_retrying() {
        // erp2 连续三轮失败：last_delivery_attempt_at 每轮推进，
        // 槽保持 Pending，错误不外泄
        let (ledger, id) = test_ledger_with_record();
        let worker = worker_with_clients(
            ledger.clone(),
            MockErpClient::failing(),
            MockErpClient::failing(),
            MockErpClient::failing(),
        );

        let mut last_attempt = None;
        for _ in 0..3 {
            sleep(Duration::from_millis(5)).await;
            let delivered = worker.poll_once().await.unwrap();
            assert_eq!(delivered, 0);

            let record = ledger.get(id).unwrap().unwrap();
            assert!(!record.delivery.slot(SyncTarget::Erp2).delivered);
            assert!(record.last_delivery_attempt_at > last_attempt);
            last_attempt = record.last_delivery_attempt_at;
        }

        let metrics = worker.metrics().await;
        assert_eq!(metrics.poll_pass_total, 3);
        assert_eq!(metrics.push_failure_total, 9);
    }

    #[tokio::test]
    async fn test_timeout_is_treated_as_failure() {
        let (ledger, id) = test_ledger_with_record();
        // 延迟超过 1s 的超时阈值
        let erp1 = MockErpClient::slow(1500);
        let worker = worker_with_clients(ledger.clone(), erp1, MockErpClient::failing(), MockErpClient::failing());

        let delivered = worker.poll_once().await.unwrap();
        assert_eq!(delivered, 0);

        let record = ledger.get(id).unwrap().unwrap();
        assert!(!record.delivery.slot(SyncTarget::Erp1).delivered);
        assert!(record.last_delivery_attempt_at.is_some());

        let metrics = worker.metrics().await;
        assert_eq!(metrics.push_timeout_total, 1);
    }

    #[tokio::test]
    async fn test_backoff_throttles_stuck_record() {
        let (ledger, _id) = test_ledger_with_record();
        let erp_fail = MockErpClient::failing();
        let mut clients: HashMap<SyncTarget, Arc<dyn ErpPushClient>> = HashMap::new();
        clients.insert(SyncTarget::Erp1, erp_fail);
        clients.insert(SyncTarget::Erp2, MockErpClient::failing());
        clients.insert(SyncTarget::Erp3, MockErpClient::failing());

        // 1 小时退避：第一轮尝试后记录被 older_than 卡住
        let config = OutboxConfig {
            attempt_backoff_seconds: 3600,
            ..OutboxConfig::default()
        };
        let worker = OutboxWorker::new(config, ledger, clients);

        worker.poll_once().await.unwrap();
        let metrics = worker.metrics().await;
        assert_eq!(metrics.push_attempt_total, 3);

        // 第二轮：退避窗口内不再尝试
        worker.poll_once().await.unwrap();
        let metrics = worker.metrics().await;
        assert_eq!(metrics.push_attempt_total, 3);
    }

    #[tokio::test]
    async fn test_records_drain_fifo() {
        let ledger = ChangeLedger::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..3u64 {
            ids.push(
                ledger
                    .record(
                        i,
                        vec![FieldChange {
                            field: "code".into(),
                            old: FieldValue::Null,
                            new: FieldValue::Text(format!("C{}", i)),
                        }],
                    )
                    .unwrap(),
            );
        }

        let erp1 = MockErpClient::ok();
        let worker = worker_with_clients(
            ledger.clone(),
            erp1.clone(),
            MockErpClient::ok(),
            MockErpClient::ok(),
        );

        worker.poll_once().await.unwrap();
        // 老记录先投递
        assert_eq!(erp1.pushed_ids(), ids);
        assert!(ledger.oldest_pending().unwrap().is_none());
    }
}
