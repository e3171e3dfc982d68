//! Command-line shell around the SPF engine: resolve a domain's policy over
//! live DNS and classify one sender IP.

use std::net::IpAddr;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spf_policy::common::dns::HickoryResolver;
use spf_policy::spf::Policy;

#[derive(Parser)]
#[command(name = "spf-policy")]
#[command(version)]
#[command(about = "Evaluate a domain's SPF policy (RFC 7208) for a sender IP")]
struct Cli {
    /// Domain whose SPF policy should be evaluated
    domain: String,

    /// Sender IP address to check against the policy
    ip: IpAddr,

    /// Print the fully resolved policy tree before the verdict
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let resolver = HickoryResolver::new();

    match Policy::build(&cli.domain, &resolver).await {
        Ok(policy) => {
            if cli.debug {
                print!("{policy}");
            }
            println!("{} -> {}", cli.ip, policy.check_ip(cli.ip));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}: {err}", cli.domain);
            println!("{} -> {}", cli.ip, err.result());
            ExitCode::SUCCESS
        }
    }
}
