//! 定时提醒触发
//!
//! 两个唤醒通道，按 tag 区分，命中时调用同一个提醒检查回调。
//! 重叠的检查不做串行化，回调本身必须能并发执行。

use serde::{Deserialize, Serialize};

use crate::config::{CHECK_GOALS_TAG, GOAL_REMINDER_TAG};
use crate::error::Result;
use crate::host::Host;

/// 唤醒通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeChannel {
    /// 宿主调度的一次性重试机会
    OneOff,
    /// 宿主调度的周期机会
    Periodic,
}

impl WakeChannel {
    /// 该通道认可的 tag
    pub fn reminder_tag(&self) -> &'static str {
        match self {
            WakeChannel::OneOff => GOAL_REMINDER_TAG,
            WakeChannel::Periodic => CHECK_GOALS_TAG,
        }
    }

    /// tag 是否触发提醒检查
    pub fn matches(&self, tag: &str) -> bool {
        tag == self.reminder_tag()
    }
}

/// 处理一次唤醒，返回是否调用了检查回调
pub async fn handle_wake(host: &dyn Host, channel: WakeChannel, tag: &str) -> Result<bool> {
    if !channel.matches(tag) {
        tracing::debug!("⏰ 忽略唤醒: channel={:?}, tag={}", channel, tag);
        return Ok(false);
    }

    tracing::info!("⏰ Checking goal reminders... (channel={:?}, tag={})", channel, tag);
    host.check_reminders(tag).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_channel_specific() {
        assert!(WakeChannel::OneOff.matches("goal-reminder"));
        assert!(!WakeChannel::OneOff.matches("check-goals"));
        assert!(WakeChannel::Periodic.matches("check-goals"));
        assert!(!WakeChannel::Periodic.matches("goal-reminder"));
        assert!(!WakeChannel::Periodic.matches(""));
    }
}
