use clap::Parser;
use futures::future::join_all;
use respline::{Client, Config, Error};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(about = "Send a command over a pipelined RESP connection and print the replies")]
struct Args {
    #[command(flatten)]
    config: Config,

    /// Pipeline the command this many times before reading any reply
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// The command followed by its arguments, e.g. `SET foo bar`
    #[arg(required = true, num_args = 1..)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();
    let (command, rest) = args
        .command
        .split_first()
        .ok_or_else(|| Error::Config("missing command".to_string()))?;

    let client = Client::connect(args.config).await?;

    let replies = (0..args.repeat)
        .map(|_| client.query(command, rest))
        .collect::<Vec<_>>();

    for reply in join_all(replies).await {
        match reply {
            Ok(frame) => println!("{}", frame),
            Err(e) => println!("(error) {}", e),
        }
    }

    info!(stats = ?client.stats(), "done");
    client.shutdown().await;

    Ok(())
}
