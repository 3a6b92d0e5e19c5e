use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cryptvfs::{fsck_check, CipherId, FileHandle, Image, ImageConfig, OpenDisposition};

#[derive(Parser)]
#[command(name = "cvfs", version = "1.0.0", about = "Encrypted single-file virtual filesystem")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty container image
    Create {
        path: PathBuf,
        /// Number of blocks to pre-allocate
        #[arg(long)]
        blocks: u64,
        /// Stream cipher: aes256ctr (default) or chacha20
        #[arg(long, default_value = "aes256ctr")]
        cipher: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create a folder inside an image
    Mkdir {
        image: PathBuf,
        path: String,
        #[arg(short, long)]
        password: String,
    },
    /// Copy a host file into the image
    Put {
        image: PathBuf,
        host_file: PathBuf,
        image_path: String,
        #[arg(short, long)]
        password: String,
    },
    /// Copy a file out of the image onto the host filesystem
    Get {
        image: PathBuf,
        image_path: String,
        host_file: PathBuf,
        #[arg(short, long)]
        password: String,
    },
    /// List a folder's contents
    Ls {
        image: PathBuf,
        path: Option<String>,
        #[arg(short, long)]
        password: String,
    },
    /// Remove a file or folder
    Rm {
        image: PathBuf,
        path: String,
        #[arg(short, long)]
        recursive: bool,
        #[arg(short, long)]
        password: String,
    },
    /// Rename/move an entry
    Mv {
        image: PathBuf,
        src: String,
        dst: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show a single entry's metadata
    Stat {
        image: PathBuf,
        path: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show image-wide capacity statistics
    Statvfs {
        image: PathBuf,
        #[arg(short, long)]
        password: String,
    },
    /// Run a read-only reachability audit
    Fsck {
        image: PathBuf,
        #[arg(short, long)]
        password: String,
        /// Print every leaked/corrupt block index
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        // ── Create ───────────────────────────────────────────────────────
        Commands::Create { path, blocks, cipher, password } => {
            let config = ImageConfig { cipher: parse_cipher(&cipher), ..ImageConfig::default() };
            let image = Image::create(&path, blocks, config, &password)?;
            image.close()?;
            println!("Created: {}  ({} blocks)", path.display(), blocks);
        }

        // ── Mkdir ────────────────────────────────────────────────────────
        Commands::Mkdir { image, path, password } => {
            let img = Image::open(&image, &password)?;
            img.add_folder(&path)?;
            img.close()?;
            println!("mkdir {}", path);
        }

        // ── Put ──────────────────────────────────────────────────────────
        Commands::Put { image, host_file, image_path, password } => {
            let img = Image::open(&image, &password)?;
            let data = fs::read(&host_file)?;
            img.add_file(&image_path)?;
            let mut handle: FileHandle = img.open_file(&image_path, OpenDisposition::overwrite())?;
            handle.write_all(&data)?;
            drop(handle);
            img.close()?;
            println!("put {} -> {} ({} B)", host_file.display(), image_path, data.len());
        }

        // ── Get ──────────────────────────────────────────────────────────
        Commands::Get { image, image_path, host_file, password } => {
            let img = Image::open(&image, &password)?;
            let mut handle = img.open_file(&image_path, OpenDisposition::read_only())?;
            let host = fs::File::create(&host_file)?;
            let mut buffered = cryptvfs::perf::WriteBuffer::new(host, 64 * 1024);
            let mut chunk = [0u8; 4096];
            loop {
                let n = handle.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                buffered.write_all(&chunk[..n])?;
            }
            buffered.flush()?;
            println!("get {} -> {} ({} B)", image_path, host_file.display(), buffered.bytes_written);
        }

        // ── Ls ───────────────────────────────────────────────────────────
        Commands::Ls { image, path, password } => {
            let img = Image::open(&image, &password)?;
            let folder_path = path.as_deref().unwrap_or("/");
            let entries = img.list(folder_path)?;
            println!("{:<32} {:>5}  {:>12}", "Name", "Type", "Size");
            for e in entries {
                println!("{:<32} {:>5}  {:>12}", e.name, if e.is_file { "file" } else { "dir" }, e.size);
            }
        }

        // ── Rm ───────────────────────────────────────────────────────────
        Commands::Rm { image, path, recursive, password } => {
            let img = Image::open(&image, &password)?;
            img.remove(&path, recursive)?;
            img.close()?;
            println!("removed {}", path);
        }

        // ── Mv ───────────────────────────────────────────────────────────
        Commands::Mv { image, src, dst, password } => {
            let img = Image::open(&image, &password)?;
            img.rename(&src, &dst)?;
            img.close()?;
            println!("{} -> {}", src, dst);
        }

        // ── Stat ─────────────────────────────────────────────────────────
        Commands::Stat { image, path, password } => {
            let img = Image::open(&image, &password)?;
            let info = img.stat(&path)?;
            println!("Name:        {}", info.name);
            println!("Type:        {}", if info.is_file { "file" } else { "folder" });
            println!("Size:        {} B", info.size);
            println!("First block: {}", info.first_block);
            println!("Slot index:  {}", info.slot_index);
        }

        // ── Statvfs ──────────────────────────────────────────────────────
        Commands::Statvfs { image, password } => {
            let img = Image::open(&image, &password)?;
            let stats = img.statvfs();
            println!("Block size:    {} B", stats.block_size);
            println!("Blocks:        {}", stats.block_count);
            println!("Free blocks:   {}", stats.free_blocks);
            println!("Max name len:  {}", stats.max_name_len);
        }

        // ── Fsck ─────────────────────────────────────────────────────────
        Commands::Fsck { image, password, verbose } => {
            let img = Image::open(&image, &password)?;
            let report = fsck_check(&img)?;
            println!("── Reachability audit ───────────────────────────────────");
            println!("  Blocks:     {}", report.block_count);
            println!("  Reachable:  {}", report.reachable_blocks);
            println!("  Allocated:  {}", report.allocated_blocks);
            println!("  Leaked:     {}", report.leaked.len());
            println!("  Corrupt:    {}", report.corrupt.len());
            println!("  Clean:      {}", report.is_clean());
            if verbose {
                for b in &report.leaked {
                    println!("    leaked block {b}");
                }
                for b in &report.corrupt {
                    println!("    corrupt block {b}");
                }
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn parse_cipher(s: &str) -> CipherId {
    match s {
        "chacha20" => CipherId::ChaCha20,
        "aes256ctr" => CipherId::Aes256Ctr,
        _ => {
            eprintln!("Unknown cipher '{}', defaulting to aes256ctr", s);
            CipherId::Aes256Ctr
        }
    }
}
