//! `tallyboard sources`: the persisted slot layout.

use crate::run::open_dashboard;
use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use tallyboard_ingest::sources::spreadsheet_id;
use tallyboard_ingest::{ExternalSheet, LocalFile, SourceDescriptor};
use tallyboard_sync::DashboardConfig;

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// Show every slot.
    List,

    /// Put a local spreadsheet file into a slot.
    AddFile {
        /// Slot index, from 0
        slot: usize,
        path: std::path::PathBuf,
        /// Worksheet to read
        #[arg(long)]
        sheet: Option<String>,
    },

    /// Put a remote spreadsheet range into a slot.
    AddSheet {
        /// Slot index, from 0
        slot: usize,
        /// Spreadsheet URL (`.../spreadsheets/d/<id>/...`)
        url: String,
        /// Worksheet name or A1 range
        range: String,
    },

    /// Empty a slot. A dataset produced from it is dropped on the backend.
    Clear {
        /// Slot index, from 0
        slot: usize,
    },
}

fn describe(descriptor: &SourceDescriptor) -> String {
    match descriptor {
        SourceDescriptor::LocalFile(file) => match &file.sheet_name {
            Some(sheet) => format!("file {} [{sheet}]", file.path.display()),
            None => format!("file {}", file.path.display()),
        },
        SourceDescriptor::ExternalSheet(sheet) => {
            let mut text = format!("sheet {} [{}]", sheet.url, sheet.range().unwrap_or("-"));
            if let Some(name) = &sheet.dataset_name {
                text.push_str(&format!(" -> {name}"));
            }
            text
        }
    }
}

pub async fn cmd_sources(config: &DashboardConfig, command: SourceCommands) -> Result<()> {
    let dashboard = open_dashboard(config)?;

    let (slot, descriptor) = match command {
        SourceCommands::List => {
            let slots = dashboard.slots();
            for index in 0..slots.len() {
                match slots.get(index) {
                    Some(descriptor) => println!("  {index}: {}", describe(descriptor)),
                    None => println!("  {index}: {}", "empty".dimmed()),
                }
            }
            return Ok(());
        }
        SourceCommands::AddFile { slot, path, sheet } => {
            if !path.is_file() {
                return Err(anyhow!("{} is not a file", path.display()));
            }
            let mut file = LocalFile::new(path);
            file.sheet_name = sheet;
            (slot, Some(SourceDescriptor::LocalFile(file)))
        }
        SourceCommands::AddSheet { slot, url, range } => {
            if spreadsheet_id(&url).is_none() {
                return Err(anyhow!("'{url}' does not look like a spreadsheet URL"));
            }
            (
                slot,
                Some(SourceDescriptor::ExternalSheet(ExternalSheet::new(&url, &range))),
            )
        }
        SourceCommands::Clear { slot } => (slot, None),
    };

    let emptied = dashboard.set_source(slot, descriptor).await?;
    println!("{} slot {slot}", "Updated".green().bold());
    if emptied {
        println!("{}", "No sources left.".yellow());
    }
    Ok(())
}
