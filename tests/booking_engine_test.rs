// ==========================================
// 预约事务测试
// ==========================================
// 职责: 验证容量约束、时长越窗、取消释放、改期与去重键
// ==========================================


#[cfg(test)]
mod booking_engine_test {
    use agenda_booking::api::ApiError;
    use agenda_booking::domain::types::{AppointmentStatus, CapacityPolicy};
    use agenda_booking::engine::{AgendaChangeEvent, AgendaEventKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::test_helpers::{
        seed_agenda, seed_service, seed_working_hours, setup_clinic_env,
    };

    /// 2026-03-02 是周一
    const LUNES: &str = "2026-03-02";

    fn cliente(nombre: &str) -> serde_json::Value {
        json!({ "nombres_completos": nombre, "celular": "3001234567" })
    }

    // ==========================================
    // 测试1: slots_per_hour=2 的经典场景
    // ==========================================

    #[tokio::test]
    async fn test_two_slots_then_full_then_freed_by_cancel() {
        let (_tmp, state) = setup_clinic_env();

        // 前两笔 10:00 预约成功
        let c1 = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), None, "agente1")
            .await
            .unwrap();
        let _c2 = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Luis"), None, "agente1")
            .await
            .unwrap();

        // 第三笔被拒, 拒绝携带桶标识与容量
        let err = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Marta"), None, "agente2")
            .await
            .unwrap_err();
        match err {
            ApiError::SlotFull {
                fecha,
                bucket_start,
                capacity,
                committed,
            } => {
                assert_eq!(fecha, LUNES);
                assert_eq!(bucket_start, "10:00");
                assert_eq!(capacity, 2);
                assert_eq!(committed, 2);
            }
            other => panic!("Expected SlotFull, got {:?}", other),
        }

        // 取消一笔后立即可再约
        assert!(state.booking_api.cancel(&c1.id, "agente1").await.unwrap());
        let c4 = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Marta"), None, "agente2")
            .await
            .unwrap();
        assert_eq!(c4.estado, AppointmentStatus::Pending);
    }

    // ==========================================
    // 测试2: 时长越窗
    // ==========================================

    #[tokio::test]
    async fn test_duration_overrun_rejected() {
        let (_tmp, state) = setup_clinic_env();

        // 45 分钟服务 17:45 起约: 越出 18:00 关门
        let err = state
            .booking_api
            .book("A1", "S2", LUNES, "17:45", cliente("Ana"), None, "agente1")
            .await
            .unwrap_err();
        match err {
            ApiError::ExceedsWindow {
                window_end,
                overrun_min,
            } => {
                assert_eq!(window_end, "18:00");
                assert_eq!(overrun_min, 30);
            }
            other => panic!("Expected ExceedsWindow, got {:?}", other),
        }

        // 17:00 起约 (17:00-17:45) 在窗口内
        let cita = state
            .booking_api
            .book("A1", "S2", LUNES, "17:00", cliente("Ana"), None, "agente1")
            .await
            .unwrap();
        assert_eq!(cita.estado, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_booking_outside_schedule_rejected() {
        let (_tmp, state) = setup_clinic_env();

        // 周日无规则 → OutsideSchedule, 携带判定原因
        let err = state
            .booking_api
            .book("A1", "S1", "2026-03-01", "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap_err();
        match err {
            ApiError::OutsideSchedule { windows, detail, .. } => {
                assert!(windows.is_empty());
                assert!(!detail.is_empty());
            }
            other => panic!("Expected OutsideSchedule, got {:?}", other),
        }
    }

    // ==========================================
    // 测试3: 取消幂等与容量回还
    // ==========================================

    #[tokio::test]
    async fn test_cancel_idempotent_and_roundtrip() {
        let (_tmp, state) = setup_clinic_env();
        let fecha = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let cita = state
            .booking_api
            .book("A1", "S1", LUNES, "09:00", cliente("Ana"), None, "agente1")
            .await
            .unwrap();

        let usage = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 9, "S1")
            .await
            .unwrap();
        assert_eq!(usage.committed, 1);
        assert_eq!(usage.capacity, 2);

        // 首次取消生效
        assert!(state.booking_api.cancel(&cita.id, "agente1").await.unwrap());
        // 二次取消为幂等空操作, 不会二次释放
        assert!(!state.booking_api.cancel(&cita.id, "agente1").await.unwrap());

        let usage = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 9, "S1")
            .await
            .unwrap();
        assert_eq!(usage.committed, 0);

        // 取消后时段恢复完整容量, 可再次预约
        let view = state
            .booking_api
            .resolve_availability("A1", LUNES, Some("09:00"), Some("S1"))
            .await
            .unwrap();
        assert_eq!(view.open, Some(true));

        let rebooked = state
            .booking_api
            .book("A1", "S1", LUNES, "09:00", cliente("Luis"), None, "agente1")
            .await
            .unwrap();

        // 协作方确认预约: 确认态同样占用容量
        state
            .appointment_repo
            .set_estado(&rebooked.id, AppointmentStatus::Confirmed)
            .unwrap();
        let usage = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 9, "S1")
            .await
            .unwrap();
        assert_eq!(usage.committed, 1);

        // 取消不存在的预约 → NotFound
        let err = state
            .booking_api
            .cancel("no-such-id", "agente1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 测试4: 去重键
    // ==========================================

    #[tokio::test]
    async fn test_idempotency_key_dedup() {
        let (_tmp, state) = setup_clinic_env();

        let key = Some("op-20260302-0001".to_string());
        let c1 = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), key.clone(), "a1")
            .await
            .unwrap();
        let c2 = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), key, "a1")
            .await
            .unwrap();

        // 同一键返回同一预约, 不重复占用容量
        assert_eq!(c1.id, c2.id);

        let fecha = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let usage = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 10, "S1")
            .await
            .unwrap();
        assert_eq!(usage.committed, 1);
    }

    // ==========================================
    // 测试5: 改期释放旧桶
    // ==========================================

    #[tokio::test]
    async fn test_edit_slot_releases_old_bucket() {
        let (_tmp, state) = setup_clinic_env();
        let fecha = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let cita = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), None, "agente1")
            .await
            .unwrap();

        let updated = state
            .booking_api
            .edit_slot(&cita.id, LUNES, "11:00", None, "agente1")
            .await
            .unwrap();
        assert_eq!(updated.hora.format("%H:%M").to_string(), "11:00");

        // 旧桶释放, 新桶占用
        let usage10 = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 10, "S1")
            .await
            .unwrap();
        let usage11 = state
            .capacity_tracker
            .bucket_usage("A1", fecha, 11, "S1")
            .await
            .unwrap();
        assert_eq!(usage10.committed, 0);
        assert_eq!(usage11.committed, 1);
    }

    #[tokio::test]
    async fn test_edit_slot_to_full_bucket_keeps_original() {
        let (_tmp, state) = setup_clinic_env();

        // 11:00 已满 (2 cupos)
        state
            .booking_api
            .book("A1", "S1", LUNES, "11:00", cliente("Luis"), None, "a1")
            .await
            .unwrap();
        state
            .booking_api
            .book("A1", "S1", LUNES, "11:00", cliente("Marta"), None, "a1")
            .await
            .unwrap();

        let cita = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap();

        let err = state
            .booking_api
            .edit_slot(&cita.id, LUNES, "11:00", None, "a1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SlotFull { .. }));

        // 原预约保持不变
        let unchanged = state.booking_api.get_appointment(&cita.id).unwrap();
        assert_eq!(unchanged.hora.format("%H:%M").to_string(), "10:00");
        assert_eq!(unchanged.estado, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_edit_cancelled_appointment_not_found() {
        let (_tmp, state) = setup_clinic_env();

        let cita = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap();
        state.booking_api.cancel(&cita.id, "a1").await.unwrap();

        let err = state
            .booking_api
            .edit_slot(&cita.id, LUNES, "11:00", None, "a1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 测试6: 跨小时桶的时长占用
    // ==========================================

    #[tokio::test]
    async fn test_booking_crossing_hour_claims_both_buckets() {
        let (_tmp, state) = setup_clinic_env();

        // 10:30 起 45 分钟 → 触及 10 点与 11 点两个桶
        state
            .booking_api
            .book("A1", "S2", LUNES, "10:30", cliente("Ana"), None, "a1")
            .await
            .unwrap();
        state
            .booking_api
            .book("A1", "S2", LUNES, "10:30", cliente("Luis"), None, "a1")
            .await
            .unwrap();

        // 10 点桶已满 → 10:00 整点也不可再约
        let err = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Marta"), None, "a1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SlotFull { .. }));
    }

    // ==========================================
    // 测试7: 桶粒度 30 分钟
    // ==========================================

    #[tokio::test]
    async fn test_bucket_granularity_30_minutes() {
        let (_tmp, state) = setup_clinic_env();

        seed_agenda(&state, "A2", "Sede Centro", 1);
        seed_working_hours(&state, "A2", 0, "08:00", "18:00");
        state
            .config_manager
            .set_bucket_granularity_minutes("A2", 30)
            .unwrap();

        // 粒度 30: 10:00 与 10:30 是不同的桶, 各自可约
        state
            .booking_api
            .book("A2", "S1", LUNES, "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap();
        state
            .booking_api
            .book("A2", "S1", LUNES, "10:30", cliente("Luis"), None, "a1")
            .await
            .unwrap();

        // 同一半小时桶第二笔被拒
        let err = state
            .booking_api
            .book("A2", "S1", LUNES, "10:00", cliente("Marta"), None, "a1")
            .await
            .unwrap_err();
        match err {
            ApiError::SlotFull { bucket_start, .. } => assert_eq!(bucket_start, "10:00"),
            other => panic!("Expected SlotFull, got {:?}", other),
        }
    }

    // ==========================================
    // 测试8: SERVICE 容量策略
    // ==========================================

    #[tokio::test]
    async fn test_service_capacity_policy() {
        let (_tmp, state) = setup_clinic_env();

        seed_agenda(&state, "A3", "Sede Sur", 1);
        seed_working_hours(&state, "A3", 0, "08:00", "18:00");
        seed_service(&state, "S4", "Terapia grupal", 30, 2);
        state
            .config_manager
            .set_capacity_policy("A3", CapacityPolicy::Service)
            .unwrap();

        // 服务自带并发 2: 同一时段两笔成功
        state
            .booking_api
            .book("A3", "S4", LUNES, "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap();
        state
            .booking_api
            .book("A3", "S4", LUNES, "10:00", cliente("Luis"), None, "a1")
            .await
            .unwrap();

        let err = state
            .booking_api
            .book("A3", "S4", LUNES, "10:00", cliente("Marta"), None, "a1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SlotFull { .. }));

        // SERVICE 策略按服务分道计数: 其他服务的同时段不受影响
        state
            .booking_api
            .book("A3", "S1", LUNES, "10:00", cliente("Pedro"), None, "a1")
            .await
            .unwrap();
    }

    // ==========================================
    // 测试9: 预约/取消发布变更事件
    // ==========================================

    #[tokio::test]
    async fn test_booking_emits_change_events() {
        let (_tmp, state) = setup_clinic_env();

        let booked = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let b = booked.clone();
        let c = cancelled.clone();
        state.on_change(
            "A1",
            Arc::new(move |event: &AgendaChangeEvent| match event.kind {
                AgendaEventKind::AppointmentBooked => {
                    b.fetch_add(1, Ordering::SeqCst);
                }
                AgendaEventKind::AppointmentCancelled => {
                    c.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }),
        );

        let cita = state
            .booking_api
            .book("A1", "S1", LUNES, "10:00", cliente("Ana"), None, "a1")
            .await
            .unwrap();
        assert_eq!(booked.load(Ordering::SeqCst), 1);

        state.booking_api.cancel(&cita.id, "a1").await.unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);

        // 幂等取消不再发布事件
        state.booking_api.cancel(&cita.id, "a1").await.unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    // ==========================================
    // 测试10: 被拒请求不产生任何写入
    // ==========================================

    #[tokio::test]
    async fn test_rejected_booking_commits_nothing() {
        let (_tmp, state) = setup_clinic_env();
        let fecha = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let _ = state
            .booking_api
            .book("A1", "S1", LUNES, "07:00", cliente("Ana"), None, "a1")
            .await
            .unwrap_err();

        let citas = state
            .appointment_repo
            .find_by_agenda_and_date("A1", fecha)
            .unwrap();
        assert!(citas.is_empty());
    }
}
