#[cfg(test)]
mod tests {
    use agentpulse::balance::{BalanceHistory, BalanceSample, MAX_SAMPLES};
    use chrono::{Duration, Utc};

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = BalanceHistory::open(&path).unwrap();
        let start = Utc::now() - Duration::hours(24);

        let triggers = MAX_SAMPLES + 25;
        for i in 0..triggers {
            history
                .record(5000.0 - i as f64, start + Duration::seconds(i as i64))
                .unwrap();
        }

        let samples = history.samples();
        assert_eq!(samples.len(), MAX_SAMPLES);
        assert_eq!(samples[0].balance, 5000.0 - 25.0);
        assert_eq!(samples.last().unwrap().balance, 5000.0 - (triggers - 1) as f64);

        // The file holds exactly the same sequence
        let persisted: Vec<BalanceSample> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(persisted, samples);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let now = Utc::now();

        {
            let history = BalanceHistory::open(&path).unwrap();
            assert!(history.latest().is_none());
            assert!(history.stats(now).is_none());
            history.record(100.0, now - Duration::hours(2)).unwrap();
            history.record(90.0, now).unwrap();
        }

        let reopened = BalanceHistory::open(&path).unwrap();
        assert_eq!(reopened.samples().len(), 2);
        assert_eq!(reopened.latest().unwrap().balance, 90.0);

        let stats = reopened.stats(now).unwrap();
        assert_eq!(stats.current_balance, 90.0);
        assert_eq!(stats.total_tracked.unwrap().hourly_rate, 5.0);

        // No temp file is left next to the history after a write
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_history_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(BalanceHistory::open(&path).is_err());
    }

    #[test]
    fn test_failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = BalanceHistory::open(&path).unwrap();
        let now = Utc::now();
        history.record(100.0, now - Duration::hours(1)).unwrap();

        // A directory squatting on the temp file name makes the write fail
        let blocker = dir.path().join("history.json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(history.record(90.0, now).is_err());

        assert_eq!(history.samples().len(), 1);
        assert_eq!(history.latest().unwrap().balance, 100.0);
        assert_eq!(history.stats(now).unwrap().samples, 1);
        let persisted: Vec<BalanceSample> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(persisted, history.samples());

        std::fs::remove_dir(&blocker).unwrap();
        history.record(90.0, now).unwrap();
        assert_eq!(history.latest().unwrap().balance, 90.0);
    }
}
