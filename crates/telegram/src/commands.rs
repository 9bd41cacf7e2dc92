use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{Error, SettingsStore};
use engine::{SchedulerCommand, SchedulerHandle, SchedulerStatus};
use scanner::{ScanHit, ScanStatus};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Number of scan results listed by `/top`.
const TOP_N: usize = 5;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub scheduler: SchedulerHandle,
    pub settings: Arc<SettingsStore>,
    pub allowed_chat_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "CryptoDesk commands:")]
pub enum Command {
    #[command(description = "Show scheduler and market scan status")]
    Status,
    #[command(description = "Start the watch-list scheduler")]
    Start,
    #[command(description = "Stop the watch-list scheduler")]
    Stop,
    #[command(description = "Start a market scan now")]
    Scan,
    #[command(description = "Show the top market scan results")]
    Top,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Stop].endpoint(handle_stop))
        .branch(case![Command::Scan].endpoint(handle_scan))
        .branch(case![Command::Top].endpoint(handle_top));

    Update::filter_message()
        .map(|msg: Message| msg.chat.id)
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from chats not in the allowed list.
async fn auth_filter(chat_id: ChatId, deps: Arc<BotDeps>) -> bool {
    let allowed = deps.allowed_chat_ids.contains(&chat_id.0);
    if !allowed {
        warn!(chat_id = chat_id.0, "Unauthorized Telegram access attempt");
    }
    allowed
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let scheduler = deps.scheduler.status().await;
    let scan = deps.scheduler.scanner().status().await;
    bot.send_message(msg.chat.id, format_status(&scheduler, &scan)).await?;
    Ok(())
}

async fn handle_start(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.scheduler.status().await.running {
        bot.send_message(msg.chat.id, "Scheduler is already running.").await?;
    } else {
        deps.scheduler.send(SchedulerCommand::Start).await?;
        let minutes = deps.settings.get().await.interval_minutes;
        bot.send_message(msg.chat.id, format!("Scheduler started, every {minutes} min."))
            .await?;
    }
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if !deps.scheduler.status().await.running {
        bot.send_message(msg.chat.id, "Scheduler is already stopped.").await?;
    } else {
        deps.scheduler.send(SchedulerCommand::Stop).await?;
        bot.send_message(msg.chat.id, "Scheduler stopped.").await?;
    }
    Ok(())
}

async fn handle_scan(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let settings = deps.settings.get().await;
    let reply = match deps
        .scheduler
        .scanner()
        .start(settings.scan_min_volume, settings.strategy)
        .await
    {
        Ok(scan_id) => {
            info!(scan_id = %scan_id, "Market scan started from Telegram");
            format!("Market scan started ({}).", settings.strategy)
        }
        Err(Error::ScanConflict) => "A market scan is already running.".to_string(),
        Err(e) => format!("Could not start scan: {e}"),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_top(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let top = deps.scheduler.scanner().top(TOP_N).await;
    bot.send_message(msg.chat.id, format_top(&top)).await?;
    Ok(())
}

pub fn format_status(scheduler: &SchedulerStatus, scan: &ScanStatus) -> String {
    let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
    };
    let scheduler_state = match (scheduler.running, scheduler.is_scanning) {
        (_, true) => "scanning",
        (true, false) => "running",
        (false, false) => "stopped",
    };
    let scan_state = if scan.running {
        format!("running {}/{}", scan.progress, scan.total)
    } else {
        match &scan.error {
            Some(e) => format!("idle (last: {e})"),
            None => "idle".to_string(),
        }
    };

    format!(
        "CryptoDesk Status\n\
         Scheduler: {scheduler_state}\n\
         Cycles: {}\n\
         Last: {}\n\
         Next: {}\n\
         Market scan: {scan_state}\n\
         Results: {}",
        scheduler.scan_count,
        when(scheduler.last_scan),
        when(scheduler.next_scan),
        scan.result_count,
    )
}

pub fn format_top(hits: &[ScanHit]) -> String {
    if hits.is_empty() {
        return "No market scan results yet.".to_string();
    }
    let mut lines = vec![format!("Top {} setups:", hits.len())];
    for (i, hit) in hits.iter().enumerate() {
        let s = &hit.signal;
        lines.push(format!(
            "{}. {} {} {} | score {} | R:R 1:{} | 24h {:+.2}%",
            i + 1,
            s.symbol,
            s.direction,
            s.confidence,
            s.score,
            s.levels.risk_reward,
            hit.price_change_pct,
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Confidence, Direction, SignalRecord, Ticker};

    #[test]
    fn empty_top_says_so() {
        assert_eq!(format_top(&[]), "No market scan results yet.");
    }

    #[test]
    fn top_lists_rank_and_rr() {
        let mut signal = SignalRecord {
            symbol: "ARBUSDT".into(),
            direction: Direction::Long,
            confidence: Confidence::High,
            score: 6,
            ..SignalRecord::default()
        };
        signal.levels.risk_reward = 2.4;
        let ticker = Ticker {
            symbol: "ARBUSDT".into(),
            last_price: 1.1,
            quote_volume: 8e7,
            price_change_pct: -3.5,
        };
        let text = format_top(&[ScanHit::new(signal, &ticker)]);
        assert!(text.contains("1. ARBUSDT LONG HIGH | score 6 | R:R 1:2.4 | 24h -3.50%"));
    }

    #[test]
    fn status_shows_scheduler_and_scan() {
        let scheduler = SchedulerStatus {
            running: true,
            scan_count: 4,
            ..SchedulerStatus::default()
        };
        let scan = ScanStatus {
            running: true,
            progress: 12,
            total: 40,
            ..ScanStatus::default()
        };
        let text = format_status(&scheduler, &scan);
        assert!(text.contains("Scheduler: running"));
        assert!(text.contains("Cycles: 4"));
        assert!(text.contains("Next: -"));
        assert!(text.contains("Market scan: running 12/40"));
    }
}
