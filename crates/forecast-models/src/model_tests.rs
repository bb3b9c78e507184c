#[cfg(test)]
mod tests {
    use super::super::config::ModelConfig;
    use super::super::model::*;
    use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
    use forecast_core::{is_weekend, Bar, BarSeries, ForecastError, ForecastSource, Technique};

    // Helper: business-day bars ending on `last`, closes following a gentle
    // oscillating uptrend.
    fn series_ending(last: NaiveDate, n: usize) -> BarSeries {
        series_ending_at(last, n, NaiveTime::MIN)
    }

    // Same closes, stamped at a fixed time of day.
    fn series_ending_at(last: NaiveDate, n: usize, clock: NaiveTime) -> BarSeries {
        let mut dates = Vec::with_capacity(n);
        let mut d = last;
        while dates.len() < n {
            if !is_weekend(d) {
                dates.push(d);
            }
            d = d.pred_opt().unwrap();
        }
        dates.reverse();
        let bars = dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let close = 100.0 + i as f64 * 0.2 + (i as f64 / 4.0).sin() * 2.0;
                Bar {
                    timestamp: date.and_time(clock),
                    open: close - 0.3,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000 + (i as u64 % 5) * 10_000,
                }
            })
            .collect();
        BarSeries::new(bars).unwrap()
    }

    fn bar_on(date: NaiveDate, close: f64) -> Bar {
        Bar {
            timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 900_000,
        }
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    fn fast_config() -> ModelConfig {
        let mut config = ModelConfig::default();
        config.ensemble.n_trees = 20;
        config
    }

    #[test]
    fn test_train_shape_for_every_technique() {
        let config = fast_config();
        let history = series_ending(friday(), 120);
        for technique in Technique::ALL {
            let mut model = ForecastModel::new(technique, &config);
            let forecast = model.train(history.clone(), 7);

            assert_eq!(forecast.technique, technique);
            assert_eq!(forecast.len(), 7, "{} horizon", technique);
            assert!(!forecast.is_fallback(), "{} fell back: {:?}", technique, forecast.source);
            assert!(forecast.dates()[0] > history.last_date());
            assert!(forecast.dates().windows(2).all(|w| w[0] < w[1]));
            for p in &forecast.points {
                assert!(!is_weekend(p.date));
                assert!(p.lower_bound <= p.predicted_price && p.predicted_price <= p.upper_bound);
            }
            assert_eq!(model.history_len(), 120);
            assert_eq!(model.last_source(), Some(&ForecastSource::Model));
        }
    }

    #[test]
    fn test_daytime_stamps_track_recent_closes() {
        let config = fast_config();
        // Aggregates for US sessions arrive stamped at 05:00 UTC.
        let history = series_ending_at(friday(), 120, NaiveTime::from_hms_opt(5, 0, 0).unwrap());
        let last_close = history.last().close;
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        for technique in Technique::ALL {
            let mut model = ForecastModel::new(technique, &config);
            let forecast = model.train(history.clone(), 5);

            assert_eq!(forecast.len(), 5, "{} horizon", technique);
            assert_eq!(forecast.source, ForecastSource::Model, "{}", technique);
            for p in &forecast.points {
                assert!(
                    (p.predicted_price - last_close).abs() < 0.1 * last_close,
                    "{} predicted {:.2} against last close {:.2}",
                    technique,
                    p.predicted_price,
                    last_close
                );
            }

            // A live minute bar appended to the daily history.
            let live = Bar {
                timestamp: monday.and_hms_opt(15, 42, 0).unwrap(),
                ..bar_on(monday, last_close + 0.5)
            };
            let next = model.refresh(live).unwrap();
            assert!(
                (next.next_price - last_close).abs() < 0.1 * last_close,
                "{} refreshed to {:.2}",
                technique,
                next.next_price
            );
        }
    }

    #[test]
    fn test_friday_forecast_lands_on_monday() {
        let config = fast_config();
        let history = series_ending(friday(), 60);
        for technique in Technique::ALL {
            let mut model = ForecastModel::new(technique, &config);
            let forecast = model.train(history.clone(), 1);
            assert_eq!(forecast.len(), 1);
            assert_eq!(forecast.points[0].date.weekday(), Weekday::Mon);
            assert_eq!(forecast.points[0].date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        }
    }

    #[test]
    fn test_decomposition_skips_market_holidays() {
        let config = fast_config();
        // Wednesday before Thanksgiving.
        let history = series_ending(NaiveDate::from_ymd_opt(2024, 11, 27).unwrap(), 60);

        let mut decomposition = ForecastModel::new(Technique::Decomposition, &config);
        let dates = decomposition.train(history.clone(), 2).dates();
        assert_eq!(
            dates,
            vec![NaiveDate::from_ymd_opt(2024, 11, 29).unwrap(), NaiveDate::from_ymd_opt(2024, 12, 2).unwrap()]
        );

        let mut arima = ForecastModel::new(Technique::Autoregressive, &config);
        assert_eq!(arima.train(history, 1).dates(), vec![NaiveDate::from_ymd_opt(2024, 11, 28).unwrap()]);
    }

    #[test]
    fn test_short_history_falls_back_with_valid_shape() {
        let config = fast_config();
        let history = series_ending(friday(), 4);
        let mut model = ForecastModel::new(Technique::Autoregressive, &config);
        let forecast = model.train(history.clone(), 5);

        assert!(forecast.is_fallback());
        assert!(matches!(model.last_source(), Some(ForecastSource::Fallback { .. })));
        assert_eq!(forecast.len(), 5);
        assert!(forecast.dates()[0] > history.last_date());
        assert!(forecast.dates().windows(2).all(|w| w[0] < w[1]));
        let base = history.closes().iter().sum::<f64>() / 4.0;
        for p in &forecast.points {
            assert!(!is_weekend(p.date));
            assert!(p.lower_bound <= p.predicted_price && p.predicted_price <= p.upper_bound);
            assert!((p.predicted_price - base).abs() <= base * 0.01 + 1e-9);
        }
        // A fallback train still initialises the model.
        assert!(model.is_initialized());
    }

    #[test]
    fn test_single_bar_falls_back_for_every_technique() {
        let config = fast_config();
        let history = series_ending(friday(), 1);
        for technique in Technique::ALL {
            let mut model = ForecastModel::new(technique, &config);
            let forecast = model.train(history.clone(), 3);
            assert!(forecast.is_fallback(), "{} should fall back", technique);
            assert_eq!(forecast.len(), 3);
        }
    }

    #[test]
    fn test_refresh_before_train() {
        let mut model = ForecastModel::new(Technique::Ensemble, &fast_config());
        let err = model.refresh(bar_on(friday(), 100.0)).unwrap_err();
        assert!(matches!(err, ForecastError::ModelNotInitialized(_)));
        assert!(!model.is_initialized());
    }

    #[test]
    fn test_refresh_grows_history_by_one() {
        let config = fast_config();
        let history = series_ending(friday(), 80);
        for technique in Technique::ALL {
            let mut model = ForecastModel::new(technique, &config);
            model.train(history.clone(), 3);

            let first = model.refresh(bar_on(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(), 117.0)).unwrap();
            assert_eq!(model.history_len(), 81);
            assert_eq!(first.target_date, NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
            assert!(first.lower_bound <= first.next_price && first.next_price <= first.upper_bound);

            model.refresh(bar_on(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(), 117.5)).unwrap();
            assert_eq!(model.history_len(), 82, "{}", technique);
        }
    }

    #[test]
    fn test_stale_bar_is_rejected() {
        let history = series_ending(friday(), 40);
        let mut model = ForecastModel::new(Technique::Autoregressive, &fast_config());
        model.train(history, 2);

        let err = model.refresh(bar_on(friday(), 101.0)).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidData(_)));
        assert_eq!(model.history_len(), 40);
    }

    #[test]
    fn test_history_cap_is_applied() {
        let history = series_ending(friday(), 50);
        let mut model = ForecastModel::new(Technique::Autoregressive, &fast_config()).with_history_cap(Some(30));
        model.train(history, 2);
        assert_eq!(model.history_len(), 30);

        model.refresh(bar_on(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(), 110.0)).unwrap();
        assert_eq!(model.history_len(), 30);
        assert_eq!(model.history().unwrap().last().close, 110.0);
    }

    #[test]
    fn test_standalone_fallback_forecast() {
        let config = fast_config();
        let history = series_ending(friday(), 10);
        let forecast = fallback_forecast(Technique::Decomposition, &history, 0, &config, "timed out");
        assert_eq!(forecast.len(), 1);
        assert_eq!(
            forecast.source,
            ForecastSource::Fallback {
                reason: "timed out".to_string()
            }
        );
    }
}
