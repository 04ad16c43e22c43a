use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use content_arbiter::model::{QueueItem, VoteInput, VoteOutcome};
use content_arbiter::rules::parse_rules_yaml;
use content_arbiter::{
    Config, Content, ContentAnalyzer, ContentType, DecisionAction, ModerationDecision, Moderator,
    SqliteStore,
};
use log::LevelFilter;
use serde::Serialize;
use std::io::Read;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("content-arbiter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Content moderation and reputation decisioning")
        .long_about(
            "Scores submissions for spam, quality and toxicity, weighs the result against the \
             author's reputation, applies configurable rules and learns from community votes.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/content-arbiter.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and its rules file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("import-rules")
                .long("import-rules")
                .value_name("FILE")
                .help("Import moderation rules from a YAML file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("analyze")
                .long("analyze")
                .value_name("FILE")
                .help("Analyze text from a file ('-' for stdin) without recording anything")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("moderate")
                .long("moderate")
                .value_name("FILE")
                .help("Moderate text from a file ('-' for stdin)")
                .requires("author")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("author")
                .long("author")
                .value_name("USER")
                .help("Author of the moderated content")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("content-id")
                .long("content-id")
                .value_name("ID")
                .help("Content id (a new id is generated when omitted)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("content-type")
                .long("content-type")
                .value_name("TYPE")
                .help("question, answer, comment, post or story")
                .default_value("post"),
        )
        .arg(
            Arg::new("reputation")
                .long("reputation")
                .value_name("USER")
                .help("Compute and show a user's reputation profile")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("vote")
                .long("vote")
                .value_name("CONTENT")
                .help("Vote on the current decision for a content id")
                .requires("voter")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("voter")
                .long("voter")
                .value_name("USER")
                .help("Voting user")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("accurate")
                .long("accurate")
                .help("Mark the decision as accurate (the default)")
                .conflicts_with("inaccurate")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("inaccurate")
                .long("inaccurate")
                .help("Mark the decision as inaccurate")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("suggest")
                .long("suggest")
                .value_name("ACTION")
                .help("Action the voter thinks was right")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("category")
                .long("category")
                .value_name("NAME")
                .help("Category tag for the vote (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("consensus")
                .long("consensus")
                .value_name("CONTENT")
                .help("Show community consensus for a content id")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("consensus-pass")
                .long("consensus-pass")
                .help("Evaluate consensus for all voted content and apply learning")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("queue")
                .long("queue")
                .value_name("LIMIT")
                .help("List pending moderation queue items")
                .num_args(0..=1)
                .default_missing_value("20")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Err(e) = run(&matches).await {
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(path) = matches.get_one::<String>("generate-config") {
        Config::default()
            .to_file(path)
            .with_context(|| format!("writing configuration to {path}"))?;
        println!("Default configuration written to: {path}");
        println!("Please edit the configuration file to suit your needs.");
        return Ok(());
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/content-arbiter.yaml");
    let config = load_config(config_path)?;
    let json = matches.get_flag("json");

    if matches.get_flag("test-config") {
        return test_config(&config);
    }

    if let Some(path) = matches.get_one::<String>("analyze") {
        let text = read_text(path)?;
        let result = ContentAnalyzer::new().analyze_concurrent(&text).await?;
        if json {
            return print_json(&result);
        }
        println!("🔍 Analysis");
        println!("  Spam:        {:.1}", result.spam_score);
        println!("  Quality:     {:.1}", result.quality_score);
        println!("  Toxicity:    {:.1} ({})", result.toxicity_score, result.severity().as_str());
        println!("  Overall:     {:.1}", result.overall_score);
        println!("  Recommended: {}", result.recommendation.as_str());
        if !result.flags.is_empty() {
            let flags: Vec<&str> = result.flags.iter().map(String::as_str).collect();
            println!("  Flags:       {}", flags.join(", "));
        }
        return Ok(());
    }

    let store = SqliteStore::open(&config.store.database_path)?;
    let moderator = Moderator::open(config.clone(), Arc::new(store)).await;

    if let Some(rules_file) = &config.rules_file {
        import_rules(&moderator, rules_file).await?;
    }

    if let Some(path) = matches.get_one::<String>("import-rules") {
        return import_rules(&moderator, path).await;
    }

    if let Some(path) = matches.get_one::<String>("moderate") {
        let author = matches
            .get_one::<String>("author")
            .context("--moderate needs --author")?;
        let content_type: ContentType = matches
            .get_one::<String>("content-type")
            .map(String::as_str)
            .unwrap_or("post")
            .parse()
            .map_err(anyhow::Error::msg)?;
        let content_id = matches
            .get_one::<String>("content-id")
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let content = Content::new(content_id, content_type, read_text(path)?, author.as_str());
        let decision = moderator.moderate(&content).await;
        return if json {
            print_json(&decision)
        } else {
            print_decision(&decision);
            Ok(())
        };
    }

    if let Some(user_id) = matches.get_one::<String>("reputation") {
        let profile = moderator.reputation().compute(user_id).await?;
        if json {
            return print_json(&profile);
        }
        println!("👤 {}", profile.user_id);
        println!("  Reputation:  {:.1}", profile.overall_score);
        println!("  Trust level: {}", profile.trust_level);
        println!("  Composite:   {:.1}", profile.factors.composite());
        println!("  Trend:       {:?}", profile.trend.direction);
        if profile.is_restricted() {
            println!("  Restricted:  {:?}", profile.restriction_level);
        }
        for advice in &profile.recommendations {
            println!("  • {advice}");
        }
        return Ok(());
    }

    if let Some(content_id) = matches.get_one::<String>("vote") {
        let voter = matches
            .get_one::<String>("voter")
            .context("--vote needs --voter")?;
        let suggested_action = matches
            .get_one::<String>("suggest")
            .map(|s| s.parse::<DecisionAction>())
            .transpose()
            .map_err(anyhow::Error::msg)?;
        let input = VoteInput {
            was_accurate: !matches.get_flag("inaccurate"),
            suggested_action,
            categories: matches
                .get_many::<String>("category")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        };
        match moderator.submit_feedback(content_id, voter, input).await? {
            VoteOutcome::Accepted => println!("✅ Vote recorded"),
            VoteOutcome::Rejected(reason) => {
                println!("🚫 Vote rejected: {reason}");
                process::exit(2);
            }
        }
        return Ok(());
    }

    if let Some(content_id) = matches.get_one::<String>("consensus") {
        let status = moderator.get_consensus(content_id).await?;
        if json {
            return print_json(&status);
        }
        let result = status.into_result()?;
        println!("🗳️  Consensus for {}", result.content_id);
        println!(
            "  Votes:      {} ({} accurate, {} expert)",
            result.total_votes, result.accurate_votes, result.expert_votes
        );
        println!("  Agreement:  {:.0}%", result.agreement_rate * 100.0);
        println!(
            "  Action:     {} (original {})",
            result.consensus_action, result.original_action
        );
        println!("  Confidence: {:.2}", result.confidence_score);
        if result.override_recommended {
            println!("  ⚠️  Override recommended:");
            for reason in &result.override_reasons {
                println!("    - {reason}");
            }
        }
        return Ok(());
    }

    if matches.get_flag("consensus-pass") {
        let report = moderator.run_consensus_pass().await?;
        if json {
            return print_json(&report);
        }
        println!(
            "Evaluated {} items, queued {} overrides, {} threshold adjustments",
            report.evaluated, report.overrides_queued, report.threshold_adjustments
        );
        let t = moderator.thresholds();
        println!(
            "Block thresholds now: toxicity {:.0}, spam {:.0}",
            t.block_toxicity, t.block_spam
        );
        return Ok(());
    }

    if let Some(limit) = matches.get_one::<usize>("queue") {
        let items = moderator.pending_queue(*limit).await?;
        if json {
            return print_json(&items);
        }
        print_queue(&items);
        return Ok(());
    }

    println!("Nothing to do. See --help for the available commands.");
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("loading configuration from {path}"))
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn test_config(config: &Config) -> anyhow::Result<()> {
    println!("🔍 Testing configuration...");
    config.validate()?;
    println!("Failure policy: {:?}", config.failure_policy);
    println!("Request timeout: {} ms", config.request_timeout_ms);
    println!("Database: {}", config.store.database_path);
    if let Some(rules_file) = &config.rules_file {
        let rules = parse_rules_file(rules_file)?;
        println!("Number of rules: {}", rules.len());
        for (i, rule) in rules.iter().enumerate() {
            println!("  Rule {}: {} (priority {})", i + 1, rule.name, rule.priority);
        }
    }
    println!("✅ Configuration is valid");
    Ok(())
}

fn parse_rules_file(path: &str) -> anyhow::Result<Vec<content_arbiter::ModerationRule>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading rules from {path}"))?;
    parse_rules_yaml(&content).with_context(|| format!("parsing rules in {path}"))
}

async fn import_rules(moderator: &Moderator, path: &str) -> anyhow::Result<()> {
    let rules = parse_rules_file(path)?;
    let count = moderator.import_rules(&rules).await?;
    log::info!("Loaded {count} rules from {path}");
    Ok(())
}

fn read_text(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_decision(decision: &ModerationDecision) {
    let icon = match decision.action {
        DecisionAction::Allow => "✅",
        DecisionAction::Flag => "🏳️",
        DecisionAction::Review => "👀",
        DecisionAction::Block => "⛔",
    };
    println!(
        "{icon} {}: {} (confidence {:.2})",
        decision.content_id, decision.action, decision.confidence
    );
    for reason in &decision.reasons {
        println!("  - {reason}");
    }
}

fn print_queue(items: &[QueueItem]) {
    if items.is_empty() {
        println!("Queue is empty");
        return;
    }
    for item in items {
        println!(
            "[{:>2}] {:?} {} {}: {}",
            item.priority,
            item.kind,
            item.content_id,
            item.assignee.as_deref().unwrap_or("-"),
            truncate_string(&item.reason, 80)
        );
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
