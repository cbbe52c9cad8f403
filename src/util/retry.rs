/// 指数バックオフ+ジッター付き再試行ロジック。
///
/// AWS推奨のFull Jitter戦略を実装します。
use std::time::Duration;

use rand::Rng;

/// 再試行戦略の設定。
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: usize,
    /// ベースとなる遅延時間（ミリ秒）
    pub base_delay_ms: u64,
    /// 最小遅延時間（ミリ秒）。プロバイダのヒントにも適用される下限。
    pub min_delay_ms: u64,
    /// 最大遅延時間（ミリ秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1000,
            min_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

impl RetryConfig {
    /// 新しい再試行設定を作成する。
    #[must_use]
    pub const fn new(
        max_attempts: usize,
        base_delay_ms: u64,
        min_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            min_delay_ms,
            max_delay_ms,
        }
    }

    /// 指定された試行回数に対する遅延時間を計算する（Full Jitter戦略）。
    ///
    /// # Arguments
    /// * `attempt` - 試行回数（0から開始）
    ///
    /// # Returns
    /// 待機すべき期間（`[min_delay_ms, max_delay_ms]` にクランプ済み）
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // 指数バックオフ: base * 2^(attempt-1)
        let multiplier = 1_u64
            .checked_shl(u32::try_from(attempt - 1).unwrap_or(u32::MAX))
            .unwrap_or(u64::MAX);
        let exponential_delay = self.base_delay_ms.saturating_mul(multiplier);

        // 上限でキャップ
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        // Full Jitter: random(0, capped_delay)
        let jittered_delay = if capped_delay > 0 {
            let mut rng = rand::rng();
            rng.random_range(0..=capped_delay)
        } else {
            0
        };

        // 下限でフロア（レートリミット対象の呼び出しが密集しないように）
        Duration::from_millis(jittered_delay.max(self.min_delay_ms))
    }

    /// プロバイダから提示された再試行ヒントを設定範囲にクランプする。
    #[must_use]
    pub fn clamp_hint(&self, hint: Duration) -> Duration {
        let ms = u64::try_from(hint.as_millis()).unwrap_or(self.max_delay_ms);
        Duration::from_millis(ms.clamp(self.min_delay_ms, self.max_delay_ms))
    }

    /// この試行回数が再試行可能かどうかを判定する。
    #[must_use]
    pub const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}
