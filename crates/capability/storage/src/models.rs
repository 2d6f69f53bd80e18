//! 存储数据模型
//!
//! 每条记录同时带有网关时间戳（事件发生时网关的时钟）与服务端时间戳（写入时存储的时钟），
//! 查询窗口一律按网关时间戳计算。

use chrono::{DateTime, TimeDelta, Utc};
use domain::Tag;
use std::time::Duration;

/// 雨量记录
#[derive(Debug, Clone, PartialEq)]
pub struct RainEntry {
    pub timestamp: DateTime<Utc>,
    pub millimeters: f64,
}

/// 温度记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemperatureEntry {
    pub timestamp: DateTime<Utc>,
    pub temp_c: i32,
}

/// 标签事件记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    pub tag: Tag,
    pub value: i32,
    pub timestamp: DateTime<Utc>,
}

/// 事件查询过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Tag(Tag),
}

impl EventFilter {
    pub fn matches(self, tag: Tag) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Tag(expected) => expected == tag,
        }
    }

    /// SQL 绑定值：`None` 表示不过滤。
    pub fn tag_code(self) -> Option<i32> {
        match self {
            EventFilter::All => None,
            EventFilter::Tag(tag) => Some(i32::from(tag.code())),
        }
    }
}

/// 最近一次状态是否落在 `window` 之内。
pub fn within_window(last: Option<DateTime<Utc>>, window: Duration) -> bool {
    let Some(last) = last else {
        return false;
    };
    match TimeDelta::from_std(window) {
        Ok(window) => last >= Utc::now() - window,
        // 超出 chrono 表示范围的窗口视为无限
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_single_tag_or_all() {
        assert!(EventFilter::All.matches(Tag::Pause));
        assert!(EventFilter::Tag(Tag::Pause).matches(Tag::Pause));
        assert!(!EventFilter::Tag(Tag::Pause).matches(Tag::Unpause));
        assert_eq!(EventFilter::All.tag_code(), None);
        assert_eq!(EventFilter::Tag(Tag::HardReset).tag_code(), Some(3));
    }

    #[test]
    fn missing_status_is_never_up() {
        assert!(!within_window(None, Duration::from_secs(3600)));
    }
}
