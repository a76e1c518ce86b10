use clap::{Arg, Command};
use colored::*;
use nhb_core::address::Address;
use nhb_core::config::LendingConfig;
use nhb_core::lending::LendingEngine;
use nhb_core::model::SystemAddresses;
use nhb_core::persistence::RocksStateStore;
use nhb_core::storage::StateStore;
use nhb_core::Wei;

fn main() {
    env_logger::init();

    let matches = Command::new("nhb-core-cli")
        .version("0.1.0")
        .author("NHB Core Engineering")
        .about("Operator CLI for the NHB lending and swap engines")
        .subcommand(
            Command::new("market")
                .about("Lending market inspection")
                .subcommand(
                    Command::new("show")
                        .about("Show a pool's market state")
                        .arg(data_dir_arg())
                        .arg(Arg::new("pool").value_name("POOL").required(true)),
                ),
        )
        .subcommand(
            Command::new("oracle")
                .about("Oracle cache inspection")
                .subcommand(
                    Command::new("rate")
                        .about("Show the cached oracle median for a pool")
                        .arg(data_dir_arg())
                        .arg(Arg::new("pool").value_name("POOL").required(true)),
                ),
        )
        .subcommand(
            Command::new("voucher")
                .about("Swap voucher ledger inspection")
                .subcommand(
                    Command::new("list")
                        .about("List minted vouchers in a time window")
                        .arg(data_dir_arg())
                        .arg(
                            Arg::new("start")
                                .long("start")
                                .value_name("UNIX_TS")
                                .help("Inclusive start timestamp")
                                .default_value("0"),
                        )
                        .arg(
                            Arg::new("end")
                                .long("end")
                                .value_name("UNIX_TS")
                                .help("Inclusive end timestamp")
                                .default_value("9999999999"),
                        )
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_name("N")
                                .help("Max rows (0 = unbounded)")
                                .default_value("50"),
                        ),
                ),
        )
        .subcommand(
            Command::new("lending")
                .about("Direct lending engine invocations")
                .subcommand(
                    Command::new("supply")
                        .about("Supply liquidity into a pool")
                        .arg(data_dir_arg())
                        .arg(Arg::new("pool").value_name("POOL").required(true))
                        .arg(
                            Arg::new("supplier")
                                .value_name("ADDRESS_HEX")
                                .required(true),
                        )
                        .arg(Arg::new("amount").value_name("WEI").required(true))
                        .arg(
                            Arg::new("block")
                                .long("block")
                                .value_name("HEIGHT")
                                .default_value("0"),
                        ),
                )
                .subcommand(
                    Command::new("accrue")
                        .about("Force an interest-accrual pass for a pool")
                        .arg(data_dir_arg())
                        .arg(Arg::new("pool").value_name("POOL").required(true))
                        .arg(
                            Arg::new("block")
                                .long("block")
                                .value_name("HEIGHT")
                                .required(true),
                        ),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("market", m)) => handle_market(m),
        Some(("oracle", m)) => handle_oracle(m),
        Some(("voucher", m)) => handle_voucher(m),
        Some(("lending", m)) => handle_lending(m),
        _ => {
            println!(
                "{}",
                "No subcommand provided. Use --help for usage information.".red()
            );
        }
    }
}

fn data_dir_arg() -> Arg {
    Arg::new("data-dir")
        .short('d')
        .long("data-dir")
        .value_name("DIR")
        .help("RocksStateStore data directory")
        .required(true)
}

fn open_store(matches: &clap::ArgMatches) -> RocksStateStore {
    let data_dir = matches.get_one::<String>("data-dir").unwrap();
    match RocksStateStore::new(data_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}", format!("failed to open data directory: {e}").red());
            std::process::exit(1);
        }
    }
}

fn handle_market(matches: &clap::ArgMatches) {
    if let Some(("show", show)) = matches.subcommand() {
        let store = open_store(show);
        let pool = show.get_one::<String>("pool").unwrap();
        match store.get_market(pool) {
            Ok(Some(market)) => {
                println!("{}", format!("pool {pool}").bold().green());
                println!("totalSupplied: {}", market.total_supplied);
                println!("totalBorrowed: {}", market.total_borrowed);
                println!("totalSupplyShares: {}", market.total_supply_shares);
                println!("supplyIndex: {}", market.supply_index.0);
                println!("borrowIndex: {}", market.borrow_index.0);
                println!("lastUpdateBlock: {}", market.last_update_block);
                println!("utilisationBps: {}", market.utilisation_bps());
            }
            Ok(None) => println!("{}", format!("pool {pool} not configured").yellow()),
            Err(e) => eprintln!("{}", format!("error: {e}").red()),
        }
    }
}

fn handle_oracle(matches: &clap::ArgMatches) {
    if let Some(("rate", rate)) = matches.subcommand() {
        let store = open_store(rate);
        let pool = rate.get_one::<String>("pool").unwrap();
        match store.get_market(pool) {
            Ok(Some(market)) => {
                let cache = market.oracle_cache;
                println!("{}", format!("pool {pool} oracle cache").bold().green());
                println!("median: {}", cache.median_wei);
                println!("previousMedian: {}", cache.prev_median_wei);
                println!("updatedBlock: {}", cache.updated_block);
            }
            Ok(None) => println!("{}", format!("pool {pool} not configured").yellow()),
            Err(e) => eprintln!("{}", format!("error: {e}").red()),
        }
    }
}

fn handle_voucher(matches: &clap::ArgMatches) {
    if let Some(("list", list)) = matches.subcommand() {
        let store = open_store(list);
        let start: i64 = list.get_one::<String>("start").unwrap().parse().unwrap_or(0);
        let end: i64 = list
            .get_one::<String>("end")
            .unwrap()
            .parse()
            .unwrap_or(i64::MAX);
        let limit: i64 = list.get_one::<String>("limit").unwrap().parse().unwrap_or(50);

        let ledger = nhb_core::swap::VoucherLedger::new(&store, nhb_core::clock::system_clock());
        match ledger.list(start, end, "", limit) {
            Ok((rows, _cursor)) => {
                for v in &rows {
                    println!(
                        "{} {} {} {} -> {}",
                        v.provider_tx_id, v.provider, v.fiat_amount, v.token, v.mint_amount_wei
                    );
                }
                println!("{}", format!("{} voucher(s)", rows.len()).cyan());
            }
            Err(e) => eprintln!("{}", format!("error: {e}").red()),
        }
    }
}

fn parse_address(hex_str: &str) -> Address {
    match hex::decode(hex_str).ok().and_then(|bytes| Address::from_slice(&bytes).ok()) {
        Some(addr) => addr,
        None => {
            eprintln!("{}", "invalid address: expected 40 hex characters".red());
            std::process::exit(1);
        }
    }
}

fn handle_lending(matches: &clap::ArgMatches) {
    match matches.subcommand() {
        Some(("supply", supply)) => {
            let store = open_store(supply);
            let pool = supply.get_one::<String>("pool").unwrap();
            let supplier = parse_address(supply.get_one::<String>("supplier").unwrap());
            let amount: u64 = supply
                .get_one::<String>("amount")
                .unwrap()
                .parse()
                .unwrap_or(0);
            let block: u64 = supply.get_one::<String>("block").unwrap().parse().unwrap_or(0);

            let engine = LendingEngine::new(store, system_addresses());
            let config = LendingConfig::default();
            match engine.supply(pool, &config, block, &supplier, &Wei::from(amount)) {
                Ok(shares) => println!("{}", format!("minted {shares} shares").green()),
                Err(e) => eprintln!("{}", format!("error: {e}").red()),
            }
        }
        Some(("accrue", accrue)) => {
            let store = open_store(accrue);
            let pool = accrue.get_one::<String>("pool").unwrap();
            let block: u64 = accrue.get_one::<String>("block").unwrap().parse().unwrap_or(0);

            let engine = LendingEngine::new(store, system_addresses());
            let config = LendingConfig::default();
            match engine.accrue_interest(pool, &config, block) {
                Ok(changed) => println!(
                    "{}",
                    format!("accrual ran for pool {pool} at block {block} (fees changed: {changed})")
                        .green()
                ),
                Err(e) => eprintln!("{}", format!("error: {e}").red()),
            }
        }
        _ => println!("{}", "No lending subcommand provided.".red()),
    }
}

fn system_addresses() -> SystemAddresses {
    SystemAddresses {
        module_treasury: Address([0u8; 20]),
        collateral_custody: Address([1u8; 20]),
    }
}
