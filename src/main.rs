use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use log::info;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use quizkit::learn::{
    generate_randomized_quiz, map_answers_to_original, score, AttemptSeed, QuestionBank,
};
use quizkit::QuizSettings;

const USAGE: &str = "usage:
  quizkit validate <bank.json>
  quizkit view <bank.json> <user-id> <quiz-id> [generation]
  quizkit score <bank.json> <user-id> <quiz-id> <answers.json> [generation] [--passing <percent>]";

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        bail!("{USAGE}");
    };
    let settings = QuizSettings::load().context("failed to load settings")?;

    match command.as_str() {
        "validate" => validate(&args[1..]),
        "view" => view(&settings, &args[1..]),
        "score" => score_file(&settings, &args[1..]),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

fn load_bank(path: &str) -> Result<QuestionBank> {
    let json = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read {path}"))?;
    QuestionBank::from_json(&json).with_context(|| format!("invalid question bank {path}"))
}

struct AttemptArgs {
    bank: QuestionBank,
    seed: AttemptSeed,
}

fn attempt_args(
    settings: &QuizSettings,
    args: &[String],
    generation_at: usize,
) -> Result<AttemptArgs> {
    if args.len() < 3 {
        bail!("{USAGE}");
    }
    let bank = load_bank(&args[0])?;
    let user_id: Uuid = args[1].parse().context("user id must be a UUID")?;
    let quiz_id: Uuid = args[2].parse().context("quiz id must be a UUID")?;
    let generation = match args.get(generation_at) {
        Some(value) if !value.starts_with("--") => {
            value.parse().context("generation must be a non-negative integer")?
        }
        _ => 0,
    };

    let seed = AttemptSeed::for_attempt(&settings.seed_salt, user_id, quiz_id, generation);
    info!("Attempt seed for generation {}: {}", generation, seed);
    Ok(AttemptArgs { bank, seed })
}

fn validate(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("{USAGE}");
    };
    let bank = load_bank(path)?;

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for question in bank.iter() {
        *by_type.entry(question.question_type().to_string()).or_default() += 1;
    }
    println!("{} questions", bank.len());
    for (question_type, count) in by_type {
        println!("  {question_type}: {count}");
    }
    Ok(())
}

fn view(settings: &QuizSettings, args: &[String]) -> Result<()> {
    let AttemptArgs { bank, seed } = attempt_args(settings, args, 3)?;
    let view = generate_randomized_quiz(&bank, settings.sample_size, seed)?;
    println!("{}", serde_json::to_string_pretty(&view.prompts())?);
    Ok(())
}

/// `--passing <n>` when given, otherwise the configured default.
fn passing_threshold(settings: &QuizSettings, args: &[String]) -> Result<i32> {
    match args.iter().position(|a| a == "--passing") {
        Some(i) => args
            .get(i + 1)
            .context("--passing needs a value")?
            .parse()
            .context("--passing must be an integer"),
        None => Ok(settings.default_passing_score),
    }
}

fn score_file(settings: &QuizSettings, args: &[String]) -> Result<()> {
    let AttemptArgs { bank, seed } = attempt_args(settings, args, 4)?;
    let answers_path = args.get(3).context("missing answers file")?;
    let answers: Vec<Option<String>> = serde_json::from_str(
        &std::fs::read_to_string(answers_path)
            .with_context(|| format!("failed to read {answers_path}"))?,
    )
    .with_context(|| format!("{answers_path} must be a JSON array of strings or nulls"))?;

    let passing = passing_threshold(settings, args)?;

    let view = generate_randomized_quiz(&bank, settings.sample_size, seed)?;
    let result = score(&view, &answers, passing)?;
    let mapped = map_answers_to_original(&view, &answers)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "result": result,
            "answers": mapped,
        }))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_passing_threshold_falls_back_to_settings() {
        let settings = QuizSettings {
            default_passing_score: 55,
            ..QuizSettings::default()
        };
        let base = ["score", "bank.json", "0", "answers.json"];
        assert_eq!(passing_threshold(&settings, &args(&base)).unwrap(), 55);

        let explicit = args(&["score", "bank.json", "0", "answers.json", "--passing", "80"]);
        assert_eq!(passing_threshold(&settings, &explicit).unwrap(), 80);

        let missing = args(&["score", "bank.json", "0", "answers.json", "--passing"]);
        assert!(passing_threshold(&settings, &missing).is_err());
    }
}
