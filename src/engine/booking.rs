// ==========================================
// 预约排程引擎 - 预约事务引擎
// ==========================================
// 红线: 读计数-比容量-写入必须原子执行; 容量永不超卖
// 职责: book / cancel / edit_slot 三个提交型操作
// ==========================================
// 并发纪律:
// - 每个 agenda 一把串行锁 (tokio::sync::Mutex), 带超时获取
// - 锁内执行仓储的 IMMEDIATE 事务原子段, 不跨 await 持有
// - 事件发布在锁与事务之外, 订阅方延迟不拖慢预约
// ==========================================

use crate::config::BookingConfigReader;
use crate::domain::agenda::{Agenda, Service};
use crate::domain::appointment::{Appointment, BookingRequest};
use crate::domain::capacity::CapacityBucket;
use crate::domain::schedule::TimeWindow;
use crate::domain::types::{AppointmentStatus, CapacityPolicy};
use crate::engine::availability::AvailabilityResolver;
use crate::engine::capacity_tracker::touched_buckets;
use crate::engine::events::{AgendaChangeEvent, AgendaEventKind, OptionalEventPublisher};
use crate::repository::{
    AgendaRepository, AppointmentRepository, BucketClaim, CancelOutcome, CapacityOutcome,
    RepositoryError, ServiceRepository,
};
use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tracing::instrument;

// ==========================================
// RejectionReason - 业务拒绝（可恢复, 面向用户）
// ==========================================
#[derive(Debug, Clone)]
pub enum RejectionReason {
    /// 时段未开放（携带当日窗口集, 便于客户端就近提示替代时段）
    OutsideSchedule {
        reasons: Vec<String>,
        windows: Vec<TimeWindow>,
    },
    /// 起点开放但时长越出窗口
    ExceedsWindow {
        window_end_min: i32,
        overrun_min: i32,
    },
    /// 容量竞争失败（携带桶标识与容量）
    SlotFull {
        bucket: CapacityBucket,
        capacity: i32,
        committed: i64,
        granularity_min: i32,
    },
    /// 串行锁等待超时, 调用方可退避重试
    Busy { timeout_ms: u64 },
}

// ==========================================
// 操作结果
// ==========================================

/// book 的结果
#[derive(Debug)]
pub enum BookingDecision {
    Booked(Appointment),
    Rejected(RejectionReason),
}

/// edit_slot 的结果
#[derive(Debug)]
pub enum EditDecision {
    Updated(Appointment),
    Rejected(RejectionReason),
    NotFound,
}

type EngineResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// BookingEngine - 预约事务引擎
// ==========================================
pub struct BookingEngine<C>
where
    C: BookingConfigReader,
{
    config: Arc<C>,
    availability: Arc<AvailabilityResolver<C>>,
    agenda_repo: Arc<AgendaRepository>,
    service_repo: Arc<ServiceRepository>,
    appointment_repo: Arc<AppointmentRepository>,
    event_publisher: OptionalEventPublisher,
    /// 每 agenda 一把串行锁（预约决策的单写入仲裁点）
    agenda_locks: StdMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl<C> BookingEngine<C>
where
    C: BookingConfigReader,
{
    /// 创建新的 BookingEngine 实例
    ///
    /// # 参数
    /// - config: 配置读取器
    /// - availability: 可用性判定引擎
    /// - agenda_repo / service_repo / appointment_repo: 仓储
    /// - event_publisher: 变更事件发布器（可为空）
    pub fn new(
        config: Arc<C>,
        availability: Arc<AvailabilityResolver<C>>,
        agenda_repo: Arc<AgendaRepository>,
        service_repo: Arc<ServiceRepository>,
        appointment_repo: Arc<AppointmentRepository>,
        event_publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            config,
            availability,
            agenda_repo,
            service_repo,
            appointment_repo,
            event_publisher,
            agenda_locks: StdMutex::new(HashMap::new()),
        }
    }

    // ==========================================
    // book - 预约提交
    // ==========================================

    /// 提交一笔预约
    ///
    /// # 步骤
    /// 1. 去重键命中 → 返回已存在的预约
    /// 2. 可用性判定（未开放 / 时长越窗 → 拒绝）
    /// 3. 计算触及桶与有效容量
    /// 4. 取 agenda 串行锁（超时 → Busy）, 锁内事务检查容量并写入
    /// 5. 锁外发布变更事件
    #[instrument(skip(self, request), fields(agenda_id = %request.agenda_id, fecha = %request.fecha))]
    pub async fn book(&self, request: BookingRequest) -> EngineResult<BookingDecision> {
        // === 步骤 1: 去重键快速路径 ===
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self
                .appointment_repo
                .find_by_idempotency_key(key)
                .map_err(boxed)?
            {
                tracing::debug!("去重键命中, 返回已存在预约: id={}", existing.id);
                return Ok(BookingDecision::Booked(existing));
            }
        }

        let agenda = self.require_agenda(&request.agenda_id)?;
        let service = self.require_service(&request.service_id)?;
        if service.duracion_minutos <= 0 {
            return Err(format!("服务时长非法: {}", service.duracion_minutos).into());
        }

        let start_min = minutes_of(request.hora);
        let end_min = start_min + service.duracion_minutos;

        // === 步骤 2: 可用性判定 ===
        let resolved = self
            .availability
            .resolve_day(&request.agenda_id, request.fecha, Some(&request.service_id))
            .await?;

        if !resolved.windows.contains(start_min) {
            return Ok(BookingDecision::Rejected(RejectionReason::OutsideSchedule {
                reasons: resolved.reasons,
                windows: resolved.windows.windows().to_vec(),
            }));
        }

        // 整个 [hora, hora+时长) 必须落在单个连续窗口内
        let window = match resolved.windows.window_containing(start_min) {
            Some(w) => w,
            None => {
                return Ok(BookingDecision::Rejected(RejectionReason::OutsideSchedule {
                    reasons: resolved.reasons,
                    windows: resolved.windows.windows().to_vec(),
                }))
            }
        };
        if !window.covers(start_min, end_min) {
            return Ok(BookingDecision::Rejected(RejectionReason::ExceedsWindow {
                window_end_min: window.end_min,
                overrun_min: end_min - window.end_min,
            }));
        }

        // === 步骤 3: 触及桶与有效容量 ===
        let (granularity, capacity, scope) =
            self.capacity_plan(&agenda, &service).await?;
        let claims: Vec<BucketClaim> =
            touched_buckets(start_min, service.duracion_minutos, granularity)
                .into_iter()
                .map(|bucket_index| BucketClaim {
                    bucket_index,
                    capacity,
                })
                .collect();

        // === 步骤 4: 串行锁 + 原子段 ===
        let now = Utc::now();
        let cita = Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            agenda_id: request.agenda_id.clone(),
            service_id: request.service_id.clone(),
            fecha: request.fecha,
            hora: request.hora,
            estado: AppointmentStatus::Pending,
            cliente: request.cliente.clone(),
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        };

        let timeout_ms = self.config.get_booking_lock_timeout_ms().await?;
        let lock = self.lock_for(&request.agenda_id);
        let guard =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), lock.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::warn!(
                        "预约锁等待超时: agenda_id={}, timeout_ms={}",
                        request.agenda_id,
                        timeout_ms
                    );
                    return Ok(BookingDecision::Rejected(RejectionReason::Busy {
                        timeout_ms,
                    }));
                }
            };

        let outcome = self.appointment_repo.insert_if_capacity(
            &cita,
            &claims,
            granularity,
            scope.as_deref(),
        );
        drop(guard);

        let outcome = match outcome {
            Ok(o) => o,
            // 去重键并发竞争: 另一请求先写入同键预约
            Err(RepositoryError::UniqueConstraintViolation(msg)) => {
                if let Some(key) = &request.idempotency_key {
                    if let Some(existing) = self
                        .appointment_repo
                        .find_by_idempotency_key(key)
                        .map_err(boxed)?
                    {
                        return Ok(BookingDecision::Booked(existing));
                    }
                }
                return Err(Box::new(RepositoryError::UniqueConstraintViolation(msg)));
            }
            Err(e) => return Err(Box::new(e)),
        };

        // === 步骤 5: 锁外发布事件 ===
        match outcome {
            CapacityOutcome::Committed => {
                tracing::info!(
                    "预约已提交: id={}, agenda_id={}, fecha={}, hora={}",
                    cita.id,
                    cita.agenda_id,
                    cita.fecha,
                    cita.hora.format("%H:%M")
                );
                self.event_publisher.publish_best_effort(AgendaChangeEvent::new(
                    cita.agenda_id.clone(),
                    AgendaEventKind::AppointmentBooked,
                    Some(cita.fecha),
                    Some("BookingEngine".to_string()),
                ));
                Ok(BookingDecision::Booked(cita))
            }
            CapacityOutcome::Full {
                bucket_index,
                capacity,
                committed,
            } => Ok(BookingDecision::Rejected(RejectionReason::SlotFull {
                bucket: CapacityBucket {
                    agenda_id: request.agenda_id.clone(),
                    fecha: request.fecha,
                    bucket_index,
                },
                capacity,
                committed,
                granularity_min: granularity,
            })),
        }
    }

    // ==========================================
    // cancel - 取消预约
    // ==========================================

    /// 取消预约并立即释放容量
    ///
    /// # 返回
    /// - CancelOutcome::Cancelled: 本次取消生效
    /// - CancelOutcome::AlreadyCancelled: 幂等空操作
    /// - CancelOutcome::NotFound: 预约不存在
    #[instrument(skip(self))]
    pub async fn cancel(&self, appointment_id: &str) -> EngineResult<CancelOutcome> {
        let existing = self
            .appointment_repo
            .find_by_id(appointment_id)
            .map_err(boxed)?;

        let Some(cita) = existing else {
            return Ok(CancelOutcome::NotFound);
        };

        let outcome = self.appointment_repo.cancel(appointment_id).map_err(boxed)?;

        if outcome == CancelOutcome::Cancelled {
            tracing::info!(
                "预约已取消: id={}, agenda_id={}, fecha={}",
                appointment_id,
                cita.agenda_id,
                cita.fecha
            );
            self.event_publisher.publish_best_effort(AgendaChangeEvent::new(
                cita.agenda_id,
                AgendaEventKind::AppointmentCancelled,
                Some(cita.fecha),
                Some("BookingEngine".to_string()),
            ));
        }

        Ok(outcome)
    }

    // ==========================================
    // edit_slot - 预约改期
    // ==========================================

    /// 改期（可同时换服务）
    ///
    /// # 规则
    /// - 等价于: 暂时释放旧桶占用 → 按新时段重跑可用性与容量检查 →
    ///   通过后才落盘; 同一预约绝不同时持有两份容量
    #[instrument(skip(self))]
    pub async fn edit_slot(
        &self,
        appointment_id: &str,
        new_fecha: NaiveDate,
        new_hora: NaiveTime,
        new_service_id: Option<&str>,
    ) -> EngineResult<EditDecision> {
        let existing = self
            .appointment_repo
            .find_by_id(appointment_id)
            .map_err(boxed)?;

        let Some(cita) = existing else {
            return Ok(EditDecision::NotFound);
        };
        // 已取消的预约不再持有时段, 不可改期
        if cita.estado == AppointmentStatus::Cancelled {
            return Ok(EditDecision::NotFound);
        }

        let agenda = self.require_agenda(&cita.agenda_id)?;
        let service_id = new_service_id.unwrap_or(&cita.service_id).to_string();
        let service = self.require_service(&service_id)?;

        let start_min = minutes_of(new_hora);
        let end_min = start_min + service.duracion_minutos;

        let resolved = self
            .availability
            .resolve_day(&cita.agenda_id, new_fecha, Some(&service_id))
            .await?;

        if !resolved.windows.contains(start_min) {
            return Ok(EditDecision::Rejected(RejectionReason::OutsideSchedule {
                reasons: resolved.reasons,
                windows: resolved.windows.windows().to_vec(),
            }));
        }
        let window = match resolved.windows.window_containing(start_min) {
            Some(w) => w,
            None => {
                return Ok(EditDecision::Rejected(RejectionReason::OutsideSchedule {
                    reasons: resolved.reasons,
                    windows: resolved.windows.windows().to_vec(),
                }))
            }
        };
        if !window.covers(start_min, end_min) {
            return Ok(EditDecision::Rejected(RejectionReason::ExceedsWindow {
                window_end_min: window.end_min,
                overrun_min: end_min - window.end_min,
            }));
        }

        let (granularity, capacity, scope) =
            self.capacity_plan(&agenda, &service).await?;
        let claims: Vec<BucketClaim> =
            touched_buckets(start_min, service.duracion_minutos, granularity)
                .into_iter()
                .map(|bucket_index| BucketClaim {
                    bucket_index,
                    capacity,
                })
                .collect();

        let timeout_ms = self.config.get_booking_lock_timeout_ms().await?;
        let lock = self.lock_for(&cita.agenda_id);
        let guard =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), lock.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    return Ok(EditDecision::Rejected(RejectionReason::Busy { timeout_ms }))
                }
            };

        let outcome = self.appointment_repo.reschedule_if_capacity(
            appointment_id,
            &cita.agenda_id,
            &service_id,
            new_fecha,
            new_hora,
            &claims,
            granularity,
            scope.as_deref(),
        );
        drop(guard);

        match outcome.map_err(boxed)? {
            CapacityOutcome::Committed => {
                tracing::info!(
                    "预约已改期: id={}, agenda_id={}, fecha={} → {}",
                    appointment_id,
                    cita.agenda_id,
                    cita.fecha,
                    new_fecha
                );
                self.event_publisher.publish_best_effort(AgendaChangeEvent::new(
                    cita.agenda_id.clone(),
                    AgendaEventKind::AppointmentRescheduled,
                    Some(new_fecha),
                    Some("BookingEngine".to_string()),
                ));

                let updated = self
                    .appointment_repo
                    .find_by_id(appointment_id)
                    .map_err(boxed)?
                    .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                        format!("改期后预约消失: {}", appointment_id).into()
                    })?;
                Ok(EditDecision::Updated(updated))
            }
            CapacityOutcome::Full {
                bucket_index,
                capacity,
                committed,
            } => Ok(EditDecision::Rejected(RejectionReason::SlotFull {
                bucket: CapacityBucket {
                    agenda_id: cita.agenda_id.clone(),
                    fecha: new_fecha,
                    bucket_index,
                },
                capacity,
                committed,
                granularity_min: granularity,
            })),
        }
    }

    // ==========================================
    // 内部工具
    // ==========================================

    /// 容量计划: (桶粒度, 有效容量, 计数范围)
    async fn capacity_plan(
        &self,
        agenda: &Agenda,
        service: &Service,
    ) -> EngineResult<(i32, i32, Option<String>)> {
        let policy = self.config.get_capacity_policy(&agenda.id).await?;
        let granularity = self
            .config
            .get_bucket_granularity_minutes(&agenda.id)
            .await?;

        let (capacity, scope) = match policy {
            CapacityPolicy::Agenda => (agenda.slots_per_hour.max(1), None),
            CapacityPolicy::Service => (service.concurrency.max(1), Some(service.id.clone())),
        };

        Ok((granularity, capacity, scope))
    }

    /// 取该 agenda 的串行锁（惰性创建）
    fn lock_for(&self, agenda_id: &str) -> Arc<TokioMutex<()>> {
        let mut locks = match self.agenda_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(agenda_id.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    fn require_agenda(&self, agenda_id: &str) -> EngineResult<Agenda> {
        self.agenda_repo
            .find_by_id(agenda_id)
            .map_err(boxed)?
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                format!("agenda 不存在: {}", agenda_id).into()
            })
    }

    fn require_service(&self, service_id: &str) -> EngineResult<Service> {
        self.service_repo
            .find_by_id(service_id)
            .map_err(boxed)?
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                format!("服务不存在: {}", service_id).into()
            })
    }
}

/// 时刻 → 当日分钟数
fn minutes_of(hora: NaiveTime) -> i32 {
    (hora.hour() * 60 + hora.minute()) as i32
}

fn boxed(e: RepositoryError) -> Box<dyn Error + Send + Sync> {
    Box::new(e)
}
