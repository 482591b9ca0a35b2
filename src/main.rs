use clap::{arg,crate_version,value_parser,ArgAction,ArgMatches,Command};
use rolzpack::{rolz_huff,ActionHandler,Direction};
use std::io::{Read,Write};
use std::time::Instant;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        if std::io::stdin().read_line(&mut ans).is_err() {
            return false;
        }
        if ans.trim_end()=="y" || ans.trim_end()=="Y" {
            log::warn!("existing file will not be truncated until the end");
            return true;
        }
        return false;
    }
    true
}

/// Reports progress on the console
struct ConsoleReporter {
    quiet: bool,
    direction: Direction,
    start: Instant,
    blocks: usize
}

impl ConsoleReporter {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            direction: Direction::Compress,
            start: Instant::now(),
            blocks: 0
        }
    }
}

impl ActionHandler for ConsoleReporter {
    fn on_init(&mut self,direction: Direction) {
        self.direction = direction;
        self.start = Instant::now();
        self.blocks = 0;
    }
    fn on_process(&mut self,in_bytes: u64,out_bytes: u64) {
        self.blocks += 1;
        log::info!("block {}: {} => {}",self.blocks,in_bytes,out_bytes);
    }
    fn on_done(&mut self,in_bytes: u64,out_bytes: u64) {
        if self.quiet {
            return;
        }
        let verb = match self.direction {
            Direction::Compress => "compressed",
            Direction::Expand => "expanded"
        };
        let secs = self.start.elapsed().as_secs_f64();
        let ratio = match in_bytes {
            0 => 0.0,
            n => 100.0 * out_bytes as f64 / n as f64
        };
        let speed = match secs > 0.0 {
            true => in_bytes as f64 / secs / 1048576.0,
            false => 0.0
        };
        eprintln!("{} {} into {} ({:.1}%) in {:.3} seconds, {:.1} MiB/s",verb,in_bytes,out_bytes,ratio,secs,speed);
    }
}

/// Run `action` with the input and output named on the command line, standard streams by default.
fn with_streams<F>(cmd: &ArgMatches,action: F) -> STDRESULT
where F: FnOnce(&mut dyn Read,&mut dyn Write) -> Result<(u64,u64),Box<dyn std::error::Error>> {
    let force = cmd.get_flag("force");
    // ask before stdin is locked, the prompt reads from it
    if let Some(path_out) = cmd.get_one::<String>("output") {
        if !force && !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
    }
    let mut in_file = match cmd.get_one::<String>("input") {
        Some(path_in) => Some(std::fs::File::open(path_in)?),
        None => None
    };
    let mut stdin = std::io::stdin().lock();
    let in_stream: &mut dyn Read = match in_file.as_mut() {
        Some(f) => f as &mut dyn Read,
        None => &mut stdin
    };
    match cmd.get_one::<String>("output") {
        Some(path_out) => {
            let mut out_file = std::fs::OpenOptions::new().write(true).truncate(false).create(true).open(path_out)?;
            let (_in_size,out_size) = action(in_stream,&mut out_file)?;
            out_file.set_len(out_size)?;
        },
        None => {
            let mut stdout = std::io::stdout().lock();
            action(in_stream,&mut stdout)?;
        }
    }
    Ok(())
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Compress:      `rolzpack compress -i my_expanded -o my_compressed`
Expand:        `rolzpack expand -i my_compressed -o my_expanded`
Pipe:          `cat my_expanded | rolzpack compress -l 4 > my_compressed`";

    let mut main_cmd = Command::new("rolzpack")
        .about("Compress and expand with ROLZ and static Huffman coding")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-i --input <PATH> "input path, default is stdin"))
        .arg(arg!(-o --output <PATH> "output path, default is stdout"))
        .arg(arg!(-l --level <LEVEL> "match search effort, 0 is fastest").value_parser(value_parser!(u8).range(0..=4))
            .default_value("2"))
        .arg(arg!(-f --force "overwrite output without asking").action(ArgAction::SetTrue))
        .arg(arg!(-q --quiet "do not print a summary").action(ArgAction::SetTrue))
        .about("compress a file"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-i --input <PATH> "input path, default is stdin"))
        .arg(arg!(-o --output <PATH> "output path, default is stdout"))
        .arg(arg!(-f --force "overwrite output without asking").action(ArgAction::SetTrue))
        .arg(arg!(-q --quiet "do not print a summary").action(ArgAction::SetTrue))
        .about("expand a file"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let mut opt = rolz_huff::STD_OPTIONS;
        opt.level = *cmd.get_one::<u8>("level").expect(RCH) as usize;
        let mut reporter = ConsoleReporter::new(cmd.get_flag("quiet"));
        with_streams(cmd,|mut src,mut dst| rolz_huff::compress(&mut src,&mut dst,&opt,Some(&mut reporter)))?;
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let mut reporter = ConsoleReporter::new(cmd.get_flag("quiet"));
        with_streams(cmd,|mut src,mut dst| rolz_huff::expand(&mut src,&mut dst,Some(&mut reporter)))?;
    }

    Ok(())
}
