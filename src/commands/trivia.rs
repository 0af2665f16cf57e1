use crate::services::trivia::{
    generate_questions, Question, Scoreboard, TriviaService, DEFAULT_CATEGORY,
};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use rand::seq::SliceRandom;
use serenity::futures::{Stream, StreamExt};
use serenity::{CreateEmbed, CreateEmbedFooter};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{interval, sleep, Duration};
use tracing::{info, warn};

const DEFAULT_ROUNDS: u32 = 5;
const MAX_ROUNDS: u32 = 20;
/// How often a pending question re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_secs(2);
const BETWEEN_QUESTIONS: Duration = Duration::from_secs(3);

/// Play trivia
#[poise::command(
    slash_command,
    subcommands("start", "stop", "categories", "leaderboard"),
    guild_only
)]
pub async fn trivia(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Start a trivia game in this channel
#[poise::command(slash_command)]
pub async fn start(
    ctx: Context<'_>,
    #[description = "Category (or any topic when generating)"] category: Option<String>,
    #[description = "Number of questions"]
    #[min = 1]
    #[max = 20]
    rounds: Option<u32>,
    #[description = "Generate fresh questions with the language model"] generate: Option<bool>,
) -> Result<(), Error> {
    let channel_id = ctx.channel_id().get();
    let Some(stop) = ctx.data().trivia.start(channel_id) else {
        ctx.say("❌ A trivia game is already running in this channel.")
            .await?;
        return Ok(());
    };

    let result = run_game(
        ctx,
        category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        rounds.unwrap_or(DEFAULT_ROUNDS).clamp(1, MAX_ROUNDS) as usize,
        generate.unwrap_or(false),
        &stop,
    )
    .await;
    ctx.data().trivia.finish(channel_id);
    result
}

async fn pick_questions(
    ctx: Context<'_>,
    category: &str,
    rounds: usize,
    generate: bool,
) -> Result<Option<Vec<Question>>, Error> {
    let mut pool = if generate {
        let Some(llm) = ctx.data().llm.as_ref() else {
            ctx.say("❌ Question generation is not configured.").await?;
            return Ok(None);
        };
        let generated = generate_questions(llm, category, rounds).await?;
        if generated.is_empty() {
            ctx.say("❌ Could not generate questions for that topic.").await?;
            return Ok(None);
        }
        generated
    } else {
        let category = category.trim().to_lowercase();
        match ctx.data().questions.questions(&category) {
            Some(questions) => questions.to_vec(),
            None => {
                ctx.say(format!(
                    "❌ Unknown category `{}`. Try `/trivia categories`.",
                    category
                ))
                .await?;
                return Ok(None);
            }
        }
    };

    pool.shuffle(&mut rand::thread_rng());
    pool.truncate(rounds);
    Ok(Some(pool))
}

async fn run_game(
    ctx: Context<'_>,
    category: String,
    rounds: usize,
    generate: bool,
    stop: &AtomicBool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    let Some(questions) = pick_questions(ctx, &category, rounds, generate).await? else {
        return Ok(());
    };

    info!(
        "Trivia started in channel {} ({}, {} questions)",
        ctx.channel_id(),
        category,
        questions.len()
    );
    ctx.say(format!(
        "🎯 Trivia time! **{}** questions from `{}`. Answer in chat.",
        questions.len(),
        category
    ))
    .await?;

    let timeout = Duration::from_secs(ctx.data().config.trivia_question_timeout_secs);
    let mut scoreboard = Scoreboard::default();
    let total = questions.len();

    for (i, question) in questions.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let embed = CreateEmbed::new()
            .title(format!("❓ Question {}/{}", i + 1, total))
            .description(&question.question)
            .footer(CreateEmbedFooter::new(format!(
                "{} seconds to answer",
                timeout.as_secs()
            )))
            .color(0x5865F2);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;

        match wait_for_answer(ctx, question, timeout, stop).await {
            Some(user_id) => {
                let score = scoreboard.award(user_id.get());
                ctx.say(format!(
                    "✅ <@{}> got it! The answer was **{}**. ({} pt)",
                    user_id, question.answers[0], score
                ))
                .await?;
            }
            None if stop.load(Ordering::SeqCst) => break,
            None => {
                ctx.say(format!(
                    "⏰ Time's up! The answer was **{}**.",
                    question.answers[0]
                ))
                .await?;
            }
        }

        if i + 1 < total {
            sleep(BETWEEN_QUESTIONS).await;
        }
    }

    if let Err(e) = TriviaService::new(ctx.data().db.clone())
        .record_game(guild_id.get(), &scoreboard)
        .await
    {
        warn!("Failed to record trivia results: {}", e);
    }

    let stopped = stop.load(Ordering::SeqCst);
    let ranking = scoreboard.ranking();
    let title = if stopped { "🛑 Trivia stopped" } else { "🏁 Trivia over" };
    let description = if ranking.is_empty() {
        "Nobody scored.".to_string()
    } else {
        let winners = scoreboard
            .winners()
            .iter()
            .map(|u| format!("<@{}>", u))
            .collect::<Vec<_>>()
            .join(", ");
        let table = ranking
            .iter()
            .map(|(user, score)| format!("<@{}>: **{}**", user, score))
            .collect::<Vec<_>>()
            .join("\n");
        format!("🏆 Winner: {}\n\n{}", winners, table)
    };
    ctx.send(
        poise::CreateReply::default().embed(
            CreateEmbed::new()
                .title(title)
                .description(description)
                .color(0x57F287),
        ),
    )
    .await?;
    Ok(())
}

/// First non-bot user to answer correctly before the deadline.
async fn wait_for_answer(
    ctx: Context<'_>,
    question: &Question,
    timeout: Duration,
    stop: &AtomicBool,
) -> Option<serenity::UserId> {
    let replies = ctx
        .channel_id()
        .await_replies(ctx.serenity_context())
        .filter(|m| !m.author.bot)
        .timeout(timeout)
        .stream()
        .map(|m| (m.author.id, m.content));
    first_correct(replies, question, stop).await
}

/// Drains one reply stream for the whole question so no answer slips
/// between polls of the stop flag.
async fn first_correct<S>(
    replies: S,
    question: &Question,
    stop: &AtomicBool,
) -> Option<serenity::UserId>
where
    S: Stream<Item = (serenity::UserId, String)>,
{
    tokio::pin!(replies);
    let mut stop_check = interval(STOP_POLL);
    loop {
        tokio::select! {
            reply = replies.next() => match reply {
                Some((user_id, content)) if question.is_correct(&content) => return Some(user_id),
                Some(_) => {}
                None => return None,
            },
            _ = stop_check.tick() => {
                if stop.load(Ordering::SeqCst) {
                    return None;
                }
            }
        }
    }
}

/// Stop the trivia game in this channel
#[poise::command(slash_command)]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    if ctx.data().trivia.stop(ctx.channel_id().get()) {
        ctx.say("🛑 Stopping trivia...").await?;
    } else {
        ctx.say("❌ No trivia game is running here.").await?;
    }
    Ok(())
}

/// List question categories
#[poise::command(slash_command)]
pub async fn categories(ctx: Context<'_>) -> Result<(), Error> {
    let bank = &ctx.data().questions;
    let mut lines = bank
        .categories()
        .into_iter()
        .map(|(name, count)| format!("`{}` ({} questions)", name, count))
        .collect::<Vec<_>>();
    if ctx.data().llm.is_some() {
        lines.push("Any other topic works with `generate: true`.".to_string());
    }
    let embed = CreateEmbed::new()
        .title("📚 Trivia categories")
        .description(lines.join("\n"))
        .color(0x5865F2);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the trivia leaderboard
#[poise::command(slash_command)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rows = TriviaService::new(ctx.data().db.clone())
        .leaderboard(guild_id.get(), 10)
        .await?;
    if rows.is_empty() {
        ctx.say("📭 Nobody has played trivia here yet.").await?;
        return Ok(());
    }

    let lines = rows
        .iter()
        .enumerate()
        .map(|(i, (user, stats))| {
            format!(
                "**{}.** <@{}>: {} pts, {} wins, {} games",
                i + 1,
                user,
                stats.points,
                stats.wins,
                stats.games
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let embed = CreateEmbed::new()
        .title("🏆 Trivia leaderboard")
        .description(lines)
        .color(0xFEE75C);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::serenity::futures::stream;
    use super::serenity::UserId;
    use tokio::sync::mpsc;

    fn capital_question() -> Question {
        Question {
            category: DEFAULT_CATEGORY.to_string(),
            question: "What is the capital of France?".into(),
            answers: vec!["Paris".into()],
        }
    }

    fn channel_stream(
        rx: mpsc::UnboundedReceiver<(UserId, String)>,
    ) -> impl Stream<Item = (UserId, String)> {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_answers_are_skipped() {
        let replies = stream::iter(vec![
            (UserId::new(1), "Lyon".to_string()),
            (UserId::new(2), " paris ".to_string()),
            (UserId::new(3), "Paris".to_string()),
        ]);
        let stop = AtomicBool::new(false);
        let winner = first_correct(replies, &capital_question(), &stop).await;
        assert_eq!(winner, Some(UserId::new(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_after_several_stop_polls_is_seen() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            sleep(STOP_POLL * 3 + Duration::from_millis(500)).await;
            let _ = tx.send((UserId::new(9), "Paris".to_string()));
        });
        let stop = AtomicBool::new(false);
        let winner = first_correct(channel_stream(rx), &capital_question(), &stop).await;
        assert_eq!(winner, Some(UserId::new(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flag_ends_the_wait() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let stop = AtomicBool::new(true);
        let winner = first_correct(channel_stream(rx), &capital_question(), &stop).await;
        assert_eq!(winner, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_means_timeout() {
        let stop = AtomicBool::new(false);
        let winner = first_correct(stream::empty::<(UserId, String)>(), &capital_question(), &stop).await;
        assert_eq!(winner, None);
    }
}
