#[cfg(test)]
mod tests {
    use agentpulse::config::DatabaseConfig;
    use agentpulse::cost;
    use agentpulse::db::{
        connection, ActivityKind, DbPool, DbService, ProcessStatus, SessionStatus, Summary,
    };
    use chrono::{Duration, Utc};
    use serde_json::json;

    // In memory database just for tests
    fn get_test_db() -> DbPool {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
        };
        connection::get_connection(&config).unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        // 1. Insert Session
        let session = DbService::insert_session(&conn, "s1", "executor", "kimi-k2", now).unwrap();
        assert_eq!(session.status, SessionStatus::Active);

        // 2. Get Session
        let fetched = DbService::get_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(fetched.agent_id, "executor");
        assert_eq!(fetched.started_at, session.started_at);
        assert!(fetched.ended_at.is_none());

        // 3. Duplicate id is a constraint violation, not an upsert
        assert!(DbService::insert_session(&conn, "s1", "other", "gpt-4o", now).is_err());
        let fetched = DbService::get_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(fetched.model, "kimi-k2");

        // 4. End Session
        assert_eq!(DbService::end_session(&conn, "s1", now).unwrap(), 1);
        let ended = DbService::get_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.ended_at.is_some());
        assert_eq!(DbService::end_session(&conn, "missing", now).unwrap(), 0);
    }

    #[test]
    fn test_model_usage_derived_fields() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        for (model, input, output) in [("kimi-k2", 1024, 512), ("unlisted-model", 0, 7), ("gpt-4o", 3, 0)] {
            DbService::insert_model_usage(&conn, "s1", model, "test", input, output, None, now).unwrap();
        }

        let rows = DbService::get_model_usage(&conn, "s1").unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.total_tokens, row.input_tokens + row.output_tokens);
            let expected = cost::cost(&row.model, row.input_tokens as u64, row.output_tokens as u64);
            assert!((row.cost_usd - expected).abs() < 1e-12);
        }
        assert_eq!(rows[0].total_tokens, 1536);
    }

    #[test]
    fn test_orphan_references_are_accepted() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let cmd = DbService::insert_command(&conn, "never-started", "bash", 10, false, Some("exit 1"), Utc::now()).unwrap();
        assert_eq!(cmd.error.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_process_start_and_end() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        let started = DbService::start_process(&conn, "s1", "42", Some("cargo build"), now).unwrap();
        assert_eq!(started.status, ProcessStatus::Running);

        let closed = DbService::end_process(&conn, "42", now + Duration::seconds(3)).unwrap();
        assert_eq!(closed, Some(started.id));

        let row = DbService::get_process(&conn, started.id).unwrap().unwrap();
        assert_eq!(row.status, ProcessStatus::Completed);
        assert!(row.ended_at.is_some());
        assert_eq!(row.command.as_deref(), Some("cargo build"));

        // Unknown pid is a silent no-op
        assert_eq!(DbService::end_process(&conn, "99", now).unwrap(), None);
    }

    #[test]
    fn test_process_end_matches_pid_across_sessions() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        let first = DbService::start_process(&conn, "s1", "7", None, now).unwrap();
        let second = DbService::start_process(&conn, "s2", "7", None, now).unwrap();

        // Only the most recent row with the pid is closed, whichever session it belongs to
        assert_eq!(DbService::end_process(&conn, "7", now).unwrap(), Some(second.id));
        let untouched = DbService::get_process(&conn, first.id).unwrap().unwrap();
        assert_eq!(untouched.status, ProcessStatus::Running);
    }

    #[test]
    fn test_summary_window() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        DbService::insert_session(&conn, "old", "executor", "kimi-k2", now - Duration::hours(48)).unwrap();
        DbService::insert_session(&conn, "new", "executor", "kimi-k2", now - Duration::hours(1)).unwrap();

        // Recent activity on the old session falls outside the window
        DbService::insert_command(&conn, "old", "bash", 5, true, None, now).unwrap();
        DbService::insert_model_usage(&conn, "old", "kimi-k2", "moonshot", 1000, 1000, None, now).unwrap();

        DbService::insert_command(&conn, "new", "web_search", 1500, true, None, now).unwrap();
        DbService::insert_command(&conn, "new", "read_file", 20, true, None, now).unwrap();
        let usage = DbService::insert_model_usage(&conn, "new", "kimi-k2", "moonshot", 1024, 512, None, now).unwrap();

        let summary = DbService::summary(&conn, now - Duration::hours(24)).unwrap();
        assert_eq!(summary.total_sessions, 1);
        assert_eq!(summary.active_sessions, 2);
        assert_eq!(summary.total_commands, 2);
        assert_eq!(summary.total_input_tokens, 1024);
        assert_eq!(summary.total_output_tokens, 512);
        assert!((summary.total_cost - usage.cost_usd).abs() < 1e-12);
    }

    #[test]
    fn test_summary_of_empty_store() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let summary = DbService::summary(&conn, Utc::now() - Duration::hours(24)).unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_recent_activity_ordering_and_limit() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let base = Utc::now() - Duration::minutes(10);

        DbService::insert_command(&conn, "s1", "bash", 100, true, None, base).unwrap();
        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 10, 20, None, base + Duration::minutes(1)).unwrap();
        DbService::insert_command(&conn, "s1", "web_search", 200, false, None, base + Duration::minutes(2)).unwrap();
        DbService::insert_model_usage(&conn, "s1", "gpt-4o", "openai", 1, 2, None, base + Duration::minutes(3)).unwrap();

        let all = DbService::recent_activity(&conn, 50).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(all[0].kind, ActivityKind::Llm);
        assert_eq!(all[0].duration_or_tokens, 3);
        assert_eq!(all[0].success, None);
        assert_eq!(all[1].name, "web_search");
        assert_eq!(all[1].success, Some(false));

        let top = DbService::recent_activity(&conn, 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].name, "web_search");
    }

    #[test]
    fn test_cost_breakdown_groups_by_day_and_model() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 1000, 0, None, now).unwrap();
        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 1000, 0, None, now).unwrap();
        DbService::insert_model_usage(&conn, "s1", "gpt-4o", "openai", 1000, 0, None, now).unwrap();
        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 1000, 0, None, now - Duration::days(3)).unwrap();
        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 1000, 0, None, now - Duration::days(10)).unwrap();

        let rows = DbService::cost_breakdown(&conn, now - Duration::days(7)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].date >= w[1].date));

        let today = now.format("%Y-%m-%d").to_string();
        let kimi_today = rows.iter().find(|r| r.date == today && r.model == "kimi-k2").unwrap();
        assert_eq!(kimi_today.requests, 2);
        assert_eq!(kimi_today.input_tokens, 2000);
        assert!((kimi_today.cost - 2.0 * 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_reasoning_log() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let base = Utc::now() - Duration::minutes(5);

        for step in 0..5 {
            DbService::insert_event(
                &conn,
                "s1",
                "thinking",
                json!({"thought": format!("step {step}"), "step": step}),
                base + Duration::seconds(step),
            )
            .unwrap();
        }
        DbService::insert_event(&conn, "s1", "other", json!({}), base + Duration::minutes(1)).unwrap();

        let log = DbService::reasoning_log(&conn, 3).unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.event_type == "thinking"));
        assert_eq!(log[0].payload["step"], 4);
        assert_eq!(log[0].payload["thought"], "step 4");
        assert_eq!(log[2].payload["step"], 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let now = Utc::now();

        DbService::insert_session(&conn, "s1", "executor", "kimi-k2", now).unwrap();
        DbService::insert_command(&conn, "s1", "bash", 1, true, None, now).unwrap();
        DbService::insert_model_usage(&conn, "s1", "kimi-k2", "moonshot", 1, 1, None, now).unwrap();
        DbService::start_process(&conn, "s1", "1", None, now).unwrap();
        DbService::insert_event(&conn, "s1", "thinking", json!({"thought": "x", "step": 1}), now).unwrap();

        DbService::reset(&conn).unwrap();

        assert!(DbService::get_session(&conn, "s1").unwrap().is_none());
        assert!(DbService::recent_activity(&conn, 10).unwrap().is_empty());
        assert!(DbService::reasoning_log(&conn, 10).unwrap().is_empty());
        assert_eq!(DbService::end_process(&conn, "1", now).unwrap(), None);
    }
}
