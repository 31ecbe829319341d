use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStat {
    pub day: NaiveDate,
    pub messages_sent: i64,
    pub messages_received: i64,
    pub chatbot_replies: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub days: Vec<DailyStat>,
    pub total_sent: i64,
    pub total_received: i64,
    pub total_chatbot_replies: i64,
}

impl StatsSummary {
    /// Build an ascending series of `days` days ending at `last_day`,
    /// filling days without a stored row with zeros.
    pub fn from_rows(rows: Vec<DailyStat>, last_day: NaiveDate, days: u32) -> Self {
        let by_day: HashMap<NaiveDate, DailyStat> =
            rows.into_iter().map(|row| (row.day, row)).collect();

        let series: Vec<DailyStat> = (0..days as i64)
            .rev()
            .map(|offset| {
                let day = last_day - Duration::days(offset);
                by_day.get(&day).cloned().unwrap_or(DailyStat {
                    day,
                    ..Default::default()
                })
            })
            .collect();

        Self {
            total_sent: series.iter().map(|d| d.messages_sent).sum(),
            total_received: series.iter().map(|d| d.messages_received).sum(),
            total_chatbot_replies: series.iter().map(|d| d.chatbot_replies).sum(),
            days: series,
        }
    }
}
