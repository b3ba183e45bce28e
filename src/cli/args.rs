use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "subprobe",
    version,
    about = "send one templated request to many subdomains and grep the responses",
    long_about = "Subprobe sends the request described in a YAML template to every host in a subdomain list and records the hosts whose responses match.\n\nExamples:\n  subprobe -r request.yml -s subdomains.txt -l statuscode -S 200\n  subprobe -r request.yml -s subdomains.txt -l headers -H Server -g nginx\n  subprobe -r request.yml -s subdomains.txt -l body -g 'admin\\s+panel' -o hits.txt\n\nTip: Use --config to persist defaults and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "File the matching hosts are written to (defaults to ./output)."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'r',
        long = "requests",
        visible_alias = "headers",
        value_name = "FILE",
        help_heading = "Input",
        help = "YAML file describing the request template."
    )]
    pub requests: Option<String>,

    #[arg(
        short = 's',
        long = "subdomains",
        value_name = "FILE",
        help_heading = "Input",
        help = "File with one host per line."
    )]
    pub subdomains: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.subprobe/config.yml when present)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'l',
        long = "grep-location",
        visible_alias = "grepLocation",
        value_name = "WHERE",
        help_heading = "Matching",
        help = "Part of the response to inspect: default, body, headers or statuscode."
    )]
    pub grep_location: Option<String>,

    #[arg(
        short = 'H',
        long = "grep-header",
        visible_alias = "grepHeader",
        value_name = "NAME",
        help_heading = "Matching",
        help = "Only inspect this header (headers mode). All headers when omitted."
    )]
    pub grep_header: Option<String>,

    #[arg(
        short = 'g',
        long = "grep",
        value_name = "REGEX",
        help_heading = "Matching",
        help = "Regular expression to look for (defaults to 'test')."
    )]
    pub grep: Option<String>,

    #[arg(
        short = 'S',
        long = "grep-status-code",
        visible_alias = "grepStatusCode",
        value_name = "CODE",
        help_heading = "Matching",
        help = "Status code to require (0 = any in headers mode)."
    )]
    pub grep_status_code: Option<u16>,

    #[arg(
        short = 't',
        long = "trace-redirects",
        help_heading = "HTTP",
        help = "Follow redirects by hand and match every hop (up to 100)."
    )]
    pub trace_redirects: bool,

    #[arg(
        short = 'p',
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Proxy URL. Recorded only, requests are sent directly."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'w',
        long = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Runtime worker threads."
    )]
    pub workers: Option<usize>,
}
