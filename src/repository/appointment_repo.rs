// ==========================================
// 预约排程引擎 - 预约仓储
// ==========================================
// 红线: 容量检查与写入必须在同一事务内完成
// 职责: citas 表的数据访问与“读计数-比容量-写入”原子段
// 说明: 预约引擎持有 per-agenda 串行锁, 本仓储在其内部
//       再以 IMMEDIATE 事务兜底, 保证无部分提交
// ==========================================

use crate::domain::appointment::Appointment;
use crate::domain::schedule::format_minutes;
use crate::domain::types::AppointmentStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row,
    TransactionBehavior};
use std::sync::{Arc, Mutex};

// ==========================================
// BucketClaim - 事务内需要检查的桶
// ==========================================
/// 预约区间触及的一个容量桶及其有效容量
#[derive(Debug, Clone, Copy)]
pub struct BucketClaim {
    pub bucket_index: i32,
    pub capacity: i32,
}

// ==========================================
// CapacityOutcome - 原子段的结果
// ==========================================
/// 容量检查结果: 写入成功, 或首个已满的桶
#[derive(Debug, Clone)]
pub enum CapacityOutcome {
    Committed,
    Full {
        bucket_index: i32,
        capacity: i32,
        committed: i64,
    },
}

// ==========================================
// CancelOutcome - 取消操作的结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 本次取消生效
    Cancelled,
    /// 之前已取消, 本次为空操作（不会二次释放容量）
    AlreadyCancelled,
    /// 预约不存在
    NotFound,
}

// ==========================================
// AppointmentRepository - 预约仓储
// ==========================================
pub struct AppointmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AppointmentRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 按 ID 查询预约
    pub fn find_by_id(&self, appointment_id: &str) -> RepositoryResult<Option<Appointment>> {
        let conn = self.get_conn()?;

        let cita = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_CITA),
                params![appointment_id],
                row_to_appointment,
            )
            .optional()?;

        Ok(cita)
    }

    /// 按去重键查询预约
    pub fn find_by_idempotency_key(&self, key: &str) -> RepositoryResult<Option<Appointment>> {
        let conn = self.get_conn()?;

        let cita = conn
            .query_row(
                &format!("{} WHERE idempotency_key = ?1", SELECT_CITA),
                params![key],
                row_to_appointment,
            )
            .optional()?;

        Ok(cita)
    }

    /// 查询日程某天的全部预约（含已取消）
    pub fn find_by_agenda_and_date(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
    ) -> RepositoryResult<Vec<Appointment>> {
        let conn = self.get_conn()?;
        let fecha_str = fecha.format("%Y-%m-%d").to_string();

        let mut stmt = conn.prepare(&format!(
            "{} WHERE agenda_id = ?1 AND fecha = ?2 ORDER BY hora",
            SELECT_CITA
        ))?;

        let citas = stmt
            .query_map(params![agenda_id, fecha_str], row_to_appointment)?
            .collect::<SqliteResult<Vec<Appointment>>>()?;

        Ok(citas)
    }

    /// 统计某桶的已提交（非取消）预约数
    ///
    /// # 参数
    /// - service_scope: Some(service_id) 时仅统计该服务（SERVICE 容量策略）
    pub fn committed_count(
        &self,
        agenda_id: &str,
        fecha: NaiveDate,
        bucket_index: i32,
        granularity_min: i32,
        service_scope: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        count_bucket(
            &conn,
            agenda_id,
            fecha,
            bucket_index,
            granularity_min,
            service_scope,
            None,
        )
    }

    // ==========================================
    // 原子段: 读计数 → 比容量 → 写入
    // ==========================================

    /// 在同一 IMMEDIATE 事务内检查全部触及桶的容量并插入预约
    ///
    /// # 返回
    /// - Ok(Committed): 预约已写入
    /// - Ok(Full{..}): 首个已满的桶, 未写入任何数据
    pub fn insert_if_capacity(
        &self,
        cita: &Appointment,
        claims: &[BucketClaim],
        granularity_min: i32,
        service_scope: Option<&str>,
    ) -> RepositoryResult<CapacityOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for claim in claims {
            let committed = count_bucket(
                &tx,
                &cita.agenda_id,
                cita.fecha,
                claim.bucket_index,
                granularity_min,
                service_scope,
                None,
            )?;
            if committed >= claim.capacity as i64 {
                // 事务随 drop 回滚（本就未写入）
                return Ok(CapacityOutcome::Full {
                    bucket_index: claim.bucket_index,
                    capacity: claim.capacity,
                    committed,
                });
            }
        }

        tx.execute(
            r#"
            INSERT INTO citas (
                id, agenda_id, service_id, fecha, hora, estado,
                cliente, idempotency_key, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                cita.id,
                cita.agenda_id,
                cita.service_id,
                cita.fecha.format("%Y-%m-%d").to_string(),
                cita.hora.format("%H:%M").to_string(),
                cita.estado.as_str(),
                cita.cliente.to_string(),
                cita.idempotency_key,
                cita.created_at.to_rfc3339(),
                cita.updated_at.to_rfc3339(),
            ],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        Ok(CapacityOutcome::Committed)
    }

    /// 在同一事务内改期: 计数排除自身（旧桶占用先行释放）, 再更新行
    ///
    /// # 返回
    /// - Ok(Committed): 改期已写入
    /// - Ok(Full{..}): 新时段已满, 原预约保持不变
    #[allow(clippy::too_many_arguments)]
    pub fn reschedule_if_capacity(
        &self,
        appointment_id: &str,
        agenda_id: &str,
        new_service_id: &str,
        new_fecha: NaiveDate,
        new_hora: NaiveTime,
        claims: &[BucketClaim],
        granularity_min: i32,
        service_scope: Option<&str>,
    ) -> RepositoryResult<CapacityOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for claim in claims {
            let committed = count_bucket(
                &tx,
                agenda_id,
                new_fecha,
                claim.bucket_index,
                granularity_min,
                service_scope,
                Some(appointment_id),
            )?;
            if committed >= claim.capacity as i64 {
                return Ok(CapacityOutcome::Full {
                    bucket_index: claim.bucket_index,
                    capacity: claim.capacity,
                    committed,
                });
            }
        }

        let affected = tx.execute(
            r#"
            UPDATE citas
            SET service_id = ?2, fecha = ?3, hora = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                appointment_id,
                new_service_id,
                new_fecha.format("%Y-%m-%d").to_string(),
                new_hora.format("%H:%M").to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Appointment".to_string(),
                id: appointment_id.to_string(),
            });
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        Ok(CapacityOutcome::Committed)
    }

    // ==========================================
    // 状态变更
    // ==========================================

    /// 取消预约（幂等: 二次取消不会二次释放容量）
    pub fn cancel(&self, appointment_id: &str) -> RepositoryResult<CancelOutcome> {
        let conn = self.get_conn()?;

        let estado: Option<String> = conn
            .query_row(
                "SELECT estado FROM citas WHERE id = ?1",
                params![appointment_id],
                |row| row.get(0),
            )
            .optional()?;

        let estado = match estado {
            Some(e) => e,
            None => return Ok(CancelOutcome::NotFound),
        };

        if estado == AppointmentStatus::Cancelled.as_str() {
            return Ok(CancelOutcome::AlreadyCancelled);
        }

        conn.execute(
            "UPDATE citas SET estado = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                appointment_id,
                AppointmentStatus::Cancelled.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(CancelOutcome::Cancelled)
    }

    /// 更新预约状态（确认等, 协作方用）
    pub fn set_estado(
        &self,
        appointment_id: &str,
        estado: AppointmentStatus,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE citas SET estado = ?2, updated_at = ?3 WHERE id = ?1",
            params![appointment_id, estado.as_str(), Utc::now().to_rfc3339()],
        )?;

        Ok(affected > 0)
    }
}

// ==========================================
// 内部工具
// ==========================================

const SELECT_CITA: &str = r#"
    SELECT id, agenda_id, service_id, fecha, hora, estado,
           cliente, idempotency_key, created_at, updated_at
    FROM citas
"#;

/// 统计某桶的已提交预约数（按开始时刻落桶, 排除已取消）
///
/// # 参数
/// - exclude_id: 改期场景下排除预约自身, 视同旧占用已释放
fn count_bucket(
    conn: &Connection,
    agenda_id: &str,
    fecha: NaiveDate,
    bucket_index: i32,
    granularity_min: i32,
    service_scope: Option<&str>,
    exclude_id: Option<&str>,
) -> RepositoryResult<i64> {
    let fecha_str = fecha.format("%Y-%m-%d").to_string();
    // "HH:MM" 定宽, 字典序与时间序一致
    let desde = format_minutes(bucket_index * granularity_min);
    let hasta = format_minutes((bucket_index + 1) * granularity_min);

    let count: i64 = conn.query_row(
        r#"
        SELECT COUNT(*)
        FROM citas
        WHERE agenda_id = ?1
          AND fecha = ?2
          AND hora >= ?3 AND hora < ?4
          AND estado != 'CANCELLED'
          AND (?5 IS NULL OR service_id = ?5)
          AND (?6 IS NULL OR id != ?6)
        "#,
        params![agenda_id, fecha_str, desde, hasta, service_scope, exclude_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

/// 行映射: citas → Appointment
fn row_to_appointment(row: &Row<'_>) -> SqliteResult<Appointment> {
    let fecha_str: String = row.get(3)?;
    let hora_str: String = row.get(4)?;
    let estado_str: String = row.get(5)?;
    let cliente_str: String = row.get(6)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let fecha = NaiveDate::parse_from_str(&fecha_str, "%Y-%m-%d")
        .map_err(|e| conversion_err(3, format!("fecha 非法 ({}): {}", fecha_str, e)))?;
    let hora = parse_hora_db(&hora_str)
        .ok_or_else(|| conversion_err(4, format!("hora 非法: {}", hora_str)))?;
    let estado = AppointmentStatus::parse(&estado_str)
        .ok_or_else(|| conversion_err(5, format!("estado 非法: {}", estado_str)))?;

    Ok(Appointment {
        id: row.get(0)?,
        agenda_id: row.get(1)?,
        service_id: row.get(2)?,
        fecha,
        hora,
        estado,
        // 客户属性对引擎不透明, 解析失败按空值处理
        cliente: serde_json::from_str(&cliente_str).unwrap_or(serde_json::Value::Null),
        idempotency_key: row.get(7)?,
        created_at: parse_ts(8, &created_str)?,
        updated_at: parse_ts(9, &updated_str)?,
    })
}

/// 时刻列解析（兼容 "HH:MM" 与 "HH:MM:SS"）
fn parse_hora_db(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// 时间戳列解析（RFC 3339）
fn parse_ts(idx: usize, s: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, format!("时间戳非法 ({}): {}", s, e)))
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}
