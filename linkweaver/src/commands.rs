use crate::CLAP_STYLING;
use clap::{arg, command};
use linkweaver_core::generator::{DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkweaver")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkweaver")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug, -vvv trace)")
                .required(false)
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("analyze")
                .about(
                    "Fetch every listed page, compare their content and recommend internal \
                links with a placement sentence for each.",
                )
                .arg(
                    arg!(-u --"base-url" <URL>)
                        .required(true)
                        .help("Site origin that page paths are resolved against")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("JSON file of page records (url, keywords, anchor_text, priority)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-m --"max-links" <NUM>)
                        .required(false)
                        .help("Maximum recommendations kept per source page")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(-t --"concurrency" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum number of in-flight page fetches")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                )
                .arg(
                    arg!(--"priority-threshold" <SCORE>)
                        .required(false)
                        .help("Destinations must have a priority strictly above this")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("0.7"),
                )
                .arg(
                    arg!(--"similarity-threshold" <SCORE>)
                        .required(false)
                        .help("Pairs must have a similarity strictly above this")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("0.65"),
                )
                .arg(
                    arg!(--"output-cap" <NUM>)
                        .required(false)
                        .help("Maximum recommendations in the final output")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("500"),
                )
                .arg(
                    arg!(--"default-priority" <SCORE>)
                        .required(false)
                        .help("Priority used for records that do not carry one")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("1.0"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-page request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-x --"exclude" <REGEX>)
                        .required(false)
                        .help("Skip page paths matching this pattern (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, csv, json")
                        .value_parser(["text", "csv", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)"),
                )
                .arg(
                    arg!(--"embedding-cache" <DIR>)
                        .required(false)
                        .env("LINKWEAVER_EMBEDDING_CACHE")
                        .help("Directory where the sentence embedding model is downloaded and cached"),
                )
                .arg(
                    arg!(--"openai-api-key" <KEY>)
                        .required(false)
                        .env("OPENAI_API_KEY")
                        .hide_env_values(true)
                        .help("Key for snippet generation; template sentences are used without one"),
                )
                .arg(
                    arg!(--"openai-base-url" <URL>)
                        .required(false)
                        .help("OpenAI-compatible API base URL")
                        .default_value(DEFAULT_OPENAI_BASE_URL),
                )
                .arg(
                    arg!(--"model" <MODEL>)
                        .required(false)
                        .help("Chat model used for snippet generation")
                        .default_value(DEFAULT_MODEL),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_analyze_defaults() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "linkweaver",
                "analyze",
                "--base-url",
                "https://example.com",
                "--input",
                "pages.json",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "analyze");
        assert_eq!(sub.get_one::<usize>("max-links"), Some(&3));
        assert_eq!(sub.get_one::<usize>("concurrency"), Some(&50));
        assert_eq!(sub.get_one::<f64>("priority-threshold"), Some(&0.7));
        assert_eq!(sub.get_one::<f64>("similarity-threshold"), Some(&0.65));
        assert_eq!(sub.get_one::<usize>("output-cap"), Some(&500));
        assert_eq!(sub.get_one::<u64>("timeout"), Some(&10));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("text"));
        assert!(sub.get_one::<String>("embedding-cache").is_none());
    }

    #[test]
    fn test_embedding_cache_flag() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "linkweaver",
                "analyze",
                "-u",
                "https://example.com",
                "-i",
                "pages.json",
                "--embedding-cache",
                "~/.cache/linkweaver",
            ])
            .unwrap();
        let sub = matches.subcommand_matches("analyze").unwrap();
        assert_eq!(
            sub.get_one::<String>("embedding-cache").map(String::as_str),
            Some("~/.cache/linkweaver")
        );
    }

    #[test]
    fn test_exclude_is_repeatable() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "linkweaver",
                "-vv",
                "analyze",
                "-u",
                "https://example.com",
                "-i",
                "pages.json",
                "-x",
                "^/login",
                "--exclude",
                "/tag/",
            ])
            .unwrap();
        assert_eq!(matches.get_count("verbose"), 2);
        let sub = matches.subcommand_matches("analyze").unwrap();
        let patterns: Vec<&String> = sub.get_many::<String>("exclude").unwrap().collect();
        assert_eq!(patterns, vec!["^/login", "/tag/"]);
    }
}
