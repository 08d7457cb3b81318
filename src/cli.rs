use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::api;
use crate::client::{HttpClient, InProcessClient};
use crate::flow::{run_flow, FlowConfig};
use crate::market_maker::{MakerConfig, MarketMaker};
use crate::oracle::SimulatedOracle;
use crate::state::AppState;
use crate::utils::shutdown_token;

/// A limit order book exchange: HTTP engine, market maker, and order flow.
#[derive(Parser)]
#[command(name = "exchange-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MakerOpts {
    /// Identity the maker's orders are submitted under
    #[arg(long, default_value_t = 8)]
    user_id: u64,

    /// Quantity per posted quote
    #[arg(long, default_value = "10")]
    order_size: Decimal,

    /// Spread at or below which no new quotes are posted
    #[arg(long, default_value = "20")]
    min_spread: Decimal,

    /// Distance from the reference price when seeding an empty book
    #[arg(long, default_value = "40")]
    seed_offset: Decimal,

    /// Distance by which a posted quote improves on the observed best
    #[arg(long, default_value = "10")]
    price_offset: Decimal,

    /// Milliseconds between quoting ticks
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Reference price served by the simulated oracle
    #[arg(long, default_value = "1000")]
    oracle_price: Decimal,
}

impl MakerOpts {
    fn config(&self) -> MakerConfig {
        MakerConfig {
            user_id: self.user_id,
            order_size: self.order_size,
            min_spread: self.min_spread,
            seed_offset: self.seed_offset,
            price_offset: self.price_offset,
            make_interval: Duration::from_millis(self.interval_ms),
        }
    }
}

#[derive(Args)]
struct FlowOpts {
    /// Identity the flow generator's orders are submitted under
    #[arg(long, default_value_t = 7)]
    flow_user_id: u64,

    /// Size of each market order
    #[arg(long, default_value = "1")]
    flow_size: Decimal,

    /// Market orders per second
    #[arg(long, default_value_t = 2)]
    rate_hz: u64,

    /// Total duration of the flow run in seconds
    #[arg(long, default_value_t = 30)]
    run_secs: u64,
}

impl FlowOpts {
    fn config(&self) -> FlowConfig {
        FlowConfig {
            user_id: self.flow_user_id,
            order_size: self.flow_size,
            rate_hz: self.rate_hz,
            run_secs: self.run_secs,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP exchange server
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        /// Instrument code this server trades
        #[arg(long, default_value = "ETH-USD")]
        market: String,
    },

    /// Run the market maker against a running exchange
    Make {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api: String,

        #[arg(long, default_value = "ETH-USD")]
        market: String,

        #[command(flatten)]
        maker: MakerOpts,
    },

    /// Fire random market orders at a running exchange
    Flow {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api: String,

        #[arg(long, default_value = "ETH-USD")]
        market: String,

        #[command(flatten)]
        flow: FlowOpts,
    },

    /// Serve, make, and send order flow in a single process
    Run {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        #[arg(long, default_value = "ETH-USD")]
        market: String,

        #[command(flatten)]
        maker: MakerOpts,

        #[command(flatten)]
        flow: FlowOpts,
    },
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shutdown = shutdown_token();

    match cli.command {
        Commands::Serve { addr, market } => {
            api::serve(addr, AppState::new(market), shutdown).await
        }
        Commands::Make { api, market, maker } => {
            let client = HttpClient::new(api, market);
            let oracle = SimulatedOracle::new(maker.oracle_price);
            MarketMaker::new(maker.config(), client, oracle)
                .run(shutdown)
                .await;
            Ok(())
        }
        Commands::Flow { api, market, flow } => {
            let client = HttpClient::new(api, market);
            run_flow(&client, flow.config(), shutdown).await?;
            Ok(())
        }
        Commands::Run {
            addr,
            market,
            maker,
            flow,
        } => {
            let state = AppState::new(market);
            let book = state.book.clone();
            let server = tokio::spawn(api::serve(addr, state, shutdown.clone()));

            let client = InProcessClient::new(book);
            let oracle = SimulatedOracle::new(maker.oracle_price);
            let maker_task = tokio::spawn(
                MarketMaker::new(maker.config(), client.clone(), oracle).run(shutdown.clone()),
            );

            // give the maker a head start to seed the book
            tokio::time::sleep(Duration::from_secs(2)).await;
            run_flow(&client, flow.config(), shutdown.clone()).await?;

            shutdown.cancel();
            let _ = maker_task.await;
            server.await??;
            Ok(())
        }
    }
}
