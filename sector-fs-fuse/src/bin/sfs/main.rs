mod cli;

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use block_dev::BlockDevice;
use clap::Parser;
use sector_fs::{FileSystem, OpenFile, SynchDisk, NUM_SECTORS};
use sector_fs_fuse::BlockFile;

use self::cli::{Cli, Command};

/// 宿主机与镜像之间每次搬运的字节数
const TRANSFER_SIZE: usize = 10;

const PERF_FILE: &str = "TestFile";
const PERF_CONTENTS: &[u8] = b"1234567890";
const PERF_FILE_SIZE: usize = PERF_CONTENTS.len() * 5;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sfs: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let fs = match cli.command {
        Command::Format => return format(&cli.disk),
        _ => mount(&cli.disk)?,
    };

    match cli.command {
        Command::Format => {}
        Command::Copy { host, path } => copy(&fs, &host, &path)?,
        Command::Append { host, path } => append(&fs, &host, &path)?,
        Command::Cat { path } => cat(&fs, &path)?,
        Command::Mkdir { path } => fs.mkdir(&path)?,
        Command::Rm { path } => fs.remove(&path)?,
        Command::Ls => {
            let mut out = String::new();
            fs.list(&mut out)?;
            print!("{out}");
        }
        Command::Dump => {
            let mut out = String::new();
            fs.print(&mut out)?;
            print!("{out}");
        }
        Command::Stat { path } => {
            let stat = fs.stat(&path)?;
            println!("sector: {}", stat.sector);
            println!("kind: {:?}", stat.kind);
            println!("size: {} bytes in {} sector(s)", stat.size, stat.sectors);
            println!("created: {}", stat.created);
            println!("accessed: {}", stat.accessed);
            println!("modified: {}", stat.modified);
        }
        Command::Perf => perf(&fs)?,
    }

    Ok(())
}

fn format(image: &Path) -> Result<()> {
    let device = BlockFile::create(image, NUM_SECTORS)?;
    let fs = FileSystem::format(Arc::new(SynchDisk::new(Arc::new(device))))?;
    println!(
        "formatted {image:?}: {NUM_SECTORS} sectors, {} free",
        fs.free_sectors()
    );
    Ok(())
}

fn mount(image: &Path) -> Result<FileSystem> {
    let device = BlockFile::open(image)?;
    if device.num_blocks() != NUM_SECTORS {
        return Err(format!("{image:?} is not a {NUM_SECTORS}-sector image").into());
    }
    Ok(FileSystem::mount(Arc::new(SynchDisk::new(Arc::new(device))))?)
}

/// 以宿主文件的大小创建文件，再分块拷入
fn copy(fs: &FileSystem, host: &Path, path: &str) -> Result<()> {
    let data = std::fs::read(host)?;
    fs.create(path, data.len())?;

    let mut file = fs.open(path)?;
    write_chunks(&mut file, &data)?;
    log::info!("copied {} bytes from {host:?} to {path:?}", data.len());
    Ok(())
}

/// 从文件末尾分块写入，文件随写入增长
fn append(fs: &FileSystem, host: &Path, path: &str) -> Result<()> {
    let data = std::fs::read(host)?;
    let mut file = match fs.open(path) {
        Err(sector_fs::Error::NotFound) => {
            fs.create(path, 0)?;
            fs.open(path)?
        }
        file => file?,
    };

    file.seek(file.length());
    write_chunks(&mut file, &data)?;
    log::info!("appended {} bytes from {host:?} to {path:?}", data.len());
    Ok(())
}

fn cat(fs: &FileSystem, path: &str) -> Result<()> {
    let mut file = fs.open(path)?;
    let mut stdout = io::stdout().lock();
    let mut buf = [0; TRANSFER_SIZE];
    loop {
        let read = file.read(&mut buf);
        if read == 0 {
            break;
        }
        stdout.write_all(&buf[..read])?;
    }
    stdout.flush()?;
    Ok(())
}

fn perf(fs: &FileSystem) -> Result<()> {
    println!("Starting file system performance test:");
    let start = Instant::now();

    fs.create(PERF_FILE, 0)?;
    {
        let mut file = fs.open(PERF_FILE)?;
        for _ in (0..PERF_FILE_SIZE).step_by(PERF_CONTENTS.len()) {
            if file.write(PERF_CONTENTS)? < PERF_CONTENTS.len() {
                return Err("perf test: unable to write".into());
            }
        }
    }
    {
        let mut file = fs.open(PERF_FILE)?;
        let mut buf = [0; PERF_CONTENTS.len()];
        for _ in (0..PERF_FILE_SIZE).step_by(PERF_CONTENTS.len()) {
            if file.read(&mut buf) < buf.len() || buf != PERF_CONTENTS {
                return Err("perf test: unable to read back".into());
            }
        }
    }
    fs.remove(PERF_FILE)?;

    println!("{PERF_FILE_SIZE} bytes written and read back in {:?}", start.elapsed());
    Ok(())
}

fn write_chunks(file: &mut OpenFile, data: &[u8]) -> Result<()> {
    for chunk in data.chunks(TRANSFER_SIZE) {
        if file.write(chunk)? < chunk.len() {
            return Err("short write".into());
        }
    }
    Ok(())
}
