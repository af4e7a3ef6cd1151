//! Offline helpers: `validate` and `next`.

use {
    anyhow::{Context, Result},
    cadence_scheduler::{clock::CronClock, now_ms, parse::parse_absolute_time_ms},
    chrono::DateTime,
    chrono_tz::Tz,
    clap::Args,
};

#[derive(Args)]
pub struct NextArgs {
    /// Cron expression; quote it or pass the fields as separate words.
    #[arg(required = true, num_args = 1..)]
    expression: Vec<String>,
    /// How many fire times to print.
    #[arg(long, short = 'n', default_value_t = 5)]
    count: usize,
    /// Start from this ISO 8601 instant instead of now.
    #[arg(long)]
    after: Option<String>,
    /// IANA timezone used to interpret the expression.
    #[arg(long)]
    tz: Option<String>,
}

pub fn validate(expression: &str) -> Result<()> {
    let clock = CronClock::utc();
    match clock.next_fire_time(expression, now_ms()) {
        Ok(next) => {
            println!("valid: next fire at {}", render(next, None));
            Ok(())
        },
        Err(e) => anyhow::bail!("{e}"),
    }
}

pub fn next(args: NextArgs) -> Result<()> {
    let expression = args.expression.join(" ");
    let tz = args
        .tz
        .as_deref()
        .map(|name| {
            name.parse::<Tz>()
                .map_err(|_| anyhow::anyhow!("unknown timezone: {name}"))
        })
        .transpose()?;
    let clock = CronClock::new(tz);
    let after = match args.after.as_deref() {
        Some(raw) => parse_absolute_time_ms(raw).context("invalid --after")?,
        None => now_ms(),
    };

    let times = clock.upcoming(&expression, after, args.count)?;
    if times.is_empty() {
        println!("no upcoming fire times");
    }
    for ms in times {
        println!("{}", render(ms, tz));
    }
    Ok(())
}

fn render(ms: u64, tz: Option<Tz>) -> String {
    let Some(dt) = i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
    else {
        return "-".to_string();
    };
    match tz {
        Some(tz) => dt.with_timezone(&tz).to_rfc3339(),
        None => dt.to_rfc3339(),
    }
}
