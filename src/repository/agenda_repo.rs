// ==========================================
// 预约排程引擎 - 日程与服务目录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: agendas / global_services 归外部数据层所有, 本仓储只读,
//       upsert 仅作为协作方/测试的数据铺设入口
// ==========================================

use crate::domain::agenda::{Agenda, Service};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// AgendaRepository - 日程仓储
// ==========================================
pub struct AgendaRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AgendaRepository {
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

    /// 按 ID 查询日程
    pub fn find_by_id(&self, agenda_id: &str) -> RepositoryResult<Option<Agenda>> {
        let conn = self.get_conn()?;

        let agenda = conn
            .query_row(
                "SELECT id, name, slots_per_hour FROM agendas WHERE id = ?1",
                params![agenda_id],
                |row| {
                    Ok(Agenda {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slots_per_hour: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(agenda)
    }

    /// 插入或更新日程（协作方/测试用）
    pub fn upsert(&self, agenda: &Agenda) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO agendas (id, name, slots_per_hour)
            VALUES (?1, ?2, ?3)
            "#,
            params![agenda.id, agenda.name, agenda.slots_per_hour],
        )?;

        Ok(())
    }
}

// ==========================================
// ServiceRepository - 服务目录仓储
// ==========================================
pub struct ServiceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ServiceRepository {
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

    /// 按 ID 查询服务
    pub fn find_by_id(&self, service_id: &str) -> RepositoryResult<Option<Service>> {
        let conn = self.get_conn()?;

        let service = conn
            .query_row(
                r#"
                SELECT id, nombre, duracion_minutos, concurrency
                FROM global_services
                WHERE id = ?1
                "#,
                params![service_id],
                |row| {
                    Ok(Service {
                        id: row.get(0)?,
                        nombre: row.get(1)?,
                        duracion_minutos: row.get(2)?,
                        concurrency: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(service)
    }

    /// 插入或更新服务（协作方/测试用）
    pub fn upsert(&self, service: &Service) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO global_services (id, nombre, duracion_minutos, concurrency)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                service.id,
                service.nombre,
                service.duracion_minutos,
                service.concurrency,
            ],
        )?;

        Ok(())
    }
}
