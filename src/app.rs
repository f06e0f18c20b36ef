use crate::api::api_types::{ApiParticipantShare, BillRequest};
use crate::api::client::ApiClient;
use crate::api::types::{Amount, Bill, BillId, Participant, User};
use crate::cache::{
  BillUpdate, BillsCache, ConfirmedBill, FreshnessPolicy, IOwe, NewBillDraft, OwedToMe, Visibility,
};
use crate::commands::{self, Action};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// One `EMAIL=AMOUNT` participant share from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
  pub email: String,
  pub amount: Amount,
}

impl FromStr for Share {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (email, amount) = s
      .split_once('=')
      .ok_or_else(|| format!("expected EMAIL=AMOUNT, got {:?}", s))?;
    let email = email.trim();
    if email.is_empty() {
      return Err(format!("missing email in {:?}", s));
    }
    Ok(Self {
      email: email.to_string(),
      amount: amount.parse().map_err(|e| format!("{}", e))?,
    })
  }
}

/// Parse a `YYYY-MM-DD` due date as midnight UTC
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>, String> {
  let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
    .map_err(|e| format!("expected YYYY-MM-DD, got {:?}: {}", s, e))?;
  date
    .and_hms_opt(0, 0, 0)
    .map(|dt| dt.and_utc())
    .ok_or_else(|| format!("invalid date {:?}", s))
}

#[derive(Debug, Clone, clap::Args)]
pub struct AddArgs {
  #[arg(short, long)]
  pub title: String,

  /// Bill total, e.g. 30.00
  #[arg(long)]
  pub total: Amount,

  /// Due date (YYYY-MM-DD)
  #[arg(long, value_parser = parse_due_date)]
  pub due: Option<DateTime<Utc>>,

  /// Participant share as EMAIL=AMOUNT (repeatable; include yourself to record your own part)
  #[arg(short, long = "share", required = true)]
  pub shares: Vec<Share>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct EditArgs {
  pub id: String,

  #[arg(short, long)]
  pub title: Option<String>,

  #[arg(long)]
  pub total: Option<Amount>,

  /// New due date (YYYY-MM-DD)
  #[arg(long, value_parser = parse_due_date, conflicts_with = "clear_due")]
  pub due: Option<DateTime<Utc>>,

  /// Remove the due date
  #[arg(long)]
  pub clear_due: bool,

  /// Replace all participants with these EMAIL=AMOUNT shares
  #[arg(short, long = "share")]
  pub shares: Vec<Share>,
}

impl EditArgs {
  fn update(&self) -> BillUpdate {
    let due_date = if self.clear_due {
      Some(None)
    } else {
      self.due.map(Some)
    };
    BillUpdate {
      title: self.title.clone(),
      total_amount: self.total.clone(),
      due_date,
    }
  }
}

/// Application state shared by every subcommand
pub struct App {
  client: ApiClient,
  cache: Arc<BillsCache>,
  email: String,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = ApiClient::new(&config)?;
    let cache = BillsCache::new(
      Arc::new(client.clone()),
      FreshnessPolicy::from(&config.cache),
    );

    Ok(Self {
      client,
      cache,
      email: config.api.email,
    })
  }

  /// Fetch bills into the cache, turning a recorded failure into an error
  async fn load(&self) -> Result<()> {
    self.cache.fetch_bills().await;
    match self.cache.error() {
      Some(message) => Err(eyre!("{}", message)),
      None => Ok(()),
    }
  }

  async fn directory(&self) -> Result<Vec<User>> {
    self
      .client
      .get_users()
      .await
      .map_err(|e| eyre!("Failed to load user directory: {}", e))
  }

  fn find_by_email<'a>(users: &'a [User], email: &str) -> Result<&'a User> {
    users
      .iter()
      .find(|u| u.email.eq_ignore_ascii_case(email))
      .ok_or_else(|| eyre!("No user with email {}", email))
  }

  fn resolve_shares(users: &[User], shares: &[Share]) -> Result<Vec<Participant>> {
    shares
      .iter()
      .map(|share| {
        let user = Self::find_by_email(users, &share.email)?;
        Ok(Participant::for_user(user, share.amount.clone()))
      })
      .collect()
  }

  fn request_for(bill: &Bill) -> BillRequest {
    BillRequest {
      title: bill.title.clone(),
      total_amount: bill.total_amount.clone(),
      due_date: bill.due_date,
      participants: bill.participants.iter().map(ApiParticipantShare::from).collect(),
    }
  }

  pub async fn owed(&self) -> Result<()> {
    self.load().await?;
    print_owed_to_me(&self.cache.owed_to_me());
    Ok(())
  }

  pub async fn owe(&self) -> Result<()> {
    self.load().await?;
    print_i_owe(&self.cache.i_owe());
    Ok(())
  }

  pub async fn show(&self, id: &str) -> Result<()> {
    let bill = self
      .client
      .get_bill(&BillId::new(id))
      .await
      .map_err(|e| eyre!("Failed to load bill {}: {}", id, e))?;

    let owner = match bill.owner_participant() {
      Some(p) => p.display_name.clone(),
      None => self
        .cache
        .fetch_user_details(&bill.owner_user_id)
        .await
        .map(|u| u.display_name)
        .unwrap_or_else(|| bill.owner_user_id.clone()),
    };

    println!("{}  ({})", bill.title, bill.id);
    println!("  owner:   {}", owner);
    println!("  total:   {}", bill.total_amount);
    println!("  due:     {}", format_date(bill.due_date));
    println!("  created: {}", bill.created_at.format("%Y-%m-%d %H:%M"));
    for p in &bill.participants {
      println!("  - {:<24} {:>10}", p.display_name, p.amount_owed);
    }
    Ok(())
  }

  /// Create a bill: show it locally first, then confirm or undo.
  pub async fn add(&self, args: AddArgs) -> Result<()> {
    let users = self.directory().await?;
    let me = Self::find_by_email(&users, &self.email)?.clone();
    let participants = Self::resolve_shares(&users, &args.shares)?;

    let request = BillRequest {
      title: args.title.clone(),
      total_amount: args.total.clone(),
      due_date: args.due,
      participants: participants.iter().map(ApiParticipantShare::from).collect(),
    };
    request.validate().map_err(|e| eyre!(e))?;

    self.load().await?;
    let (temp_id, rollback) = self.cache.optimistically_add_bill(
      NewBillDraft {
        id: None,
        owner_user_id: me.id,
        title: args.title,
        total_amount: args.total,
        due_date: args.due,
        created_at: None,
      },
      participants,
    );

    match self.client.create_bill(&request).await {
      Ok(bill) => {
        self
          .cache
          .replace_temp_bill_with_real_bill(&temp_id, ConfirmedBill::from(&bill));
        info!(bill_id = %bill.id, "Created bill");
        println!("Created bill {}", bill.id);
        print_owed_to_me(&self.cache.owed_to_me());
        Ok(())
      }
      Err(e) => {
        rollback.apply();
        Err(eyre!("Failed to create bill: {}", e))
      }
    }
  }

  /// Update one of my bills; the server replaces all participants, so the
  /// request always carries the full merged bill.
  pub async fn edit(&self, args: EditArgs) -> Result<()> {
    self.load().await?;
    let id = BillId::new(args.id.as_str());
    let snapshot = self
      .cache
      .snapshot()
      .ok_or_else(|| eyre!("No bills loaded"))?;
    let existing = snapshot
      .find_owned(&id)
      .ok_or_else(|| eyre!("Bill {} is not one of your bills", id))?;

    let participants = if args.shares.is_empty() {
      None
    } else {
      let users = self.directory().await?;
      Some(Self::resolve_shares(&users, &args.shares)?)
    };

    let update = args.update();
    let mut merged = Bill::clone(existing);
    if let Some(title) = &update.title {
      merged.title = title.clone();
    }
    if let Some(total) = &update.total_amount {
      merged.total_amount = total.clone();
    }
    if let Some(due_date) = update.due_date {
      merged.due_date = due_date;
    }
    if let Some(participants) = &participants {
      merged.participants = participants.clone();
    }
    let request = Self::request_for(&merged);
    request.validate().map_err(|e| eyre!(e))?;

    let rollback = self.cache.optimistically_update_bill(&id, update, participants);
    match self.client.update_bill(&id, &request).await {
      Ok(bill) => {
        info!(bill_id = %bill.id, "Updated bill");
        println!("Updated bill {}", bill.id);
        Ok(())
      }
      Err(e) => {
        rollback.apply();
        Err(eyre!("Failed to update bill {}: {}", id, e))
      }
    }
  }

  pub async fn remove(&self, id: &str) -> Result<()> {
    self.load().await?;
    let id = BillId::new(id);

    let rollback = self.cache.optimistically_remove_bill(&id);
    if rollback.is_noop() {
      warn!(bill_id = %id, "Bill not in local cache, deleting on the server only");
    }
    match self.client.delete_bill(&id).await {
      Ok(()) => {
        info!(bill_id = %id, "Deleted bill");
        println!("Deleted bill {}", id);
        Ok(())
      }
      Err(e) => {
        rollback.apply();
        Err(eyre!("Failed to delete bill {}: {}", id, e))
      }
    }
  }

  /// Keep the cache attached and reprint both views whenever it changes.
  pub async fn watch(&self) -> Result<()> {
    let (visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let handle = self
      .cache
      .attach(visibility_rx)
      .ok_or_else(|| eyre!("Refresh already running"))?;
    let mut events = EventHandler::new(self.cache.subscribe());

    println!("Watching bills. Type 'help' for commands.");

    while let Some(event) = events.next().await {
      match event {
        Event::Changed => {
          self.print_views();
          self.print_status();
        }
        Event::Input(line) => match commands::resolve(&line) {
          Some(Action::Refresh) => {
            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move { cache.fetch_bills().await });
          }
          Some(Action::Hide) => {
            visibility_tx.send_replace(Visibility::Hidden);
          }
          Some(Action::Show) => {
            visibility_tx.send_replace(Visibility::Visible);
          }
          Some(Action::OwedToMe) => print_owed_to_me(&self.cache.owed_to_me()),
          Some(Action::IOwe) => print_i_owe(&self.cache.i_owe()),
          Some(Action::Status) => self.print_status(),
          Some(Action::Help) => print_help(),
          Some(Action::Quit) => break,
          None if line.trim().is_empty() => {}
          None => println!("Unknown command {:?}. Type 'help' for commands.", line.trim()),
        },
        Event::Eof => break,
      }
    }

    handle.stop();
    Ok(())
  }

  fn print_views(&self) {
    print_owed_to_me(&self.cache.owed_to_me());
    print_i_owe(&self.cache.i_owe());
  }

  fn print_status(&self) {
    let fetched = self
      .cache
      .last_fetch_time()
      .map(|t| t.format("%H:%M:%S").to_string())
      .unwrap_or_else(|| "never".to_string());
    let state = if self.cache.is_loading() {
      "loading"
    } else if self.cache.is_stale() {
      "stale"
    } else {
      "fresh"
    };
    let revision = self.cache.revision();
    match self.cache.error() {
      Some(error) => println!(
        "[{} | rev {} | last fetch {} | error: {}]",
        state, revision, fetched, error
      ),
      None => println!("[{} | rev {} | last fetch {}]", state, revision, fetched),
    }
  }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
  date
    .map(|d| d.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| "-".to_string())
}

fn print_owed_to_me(bills: &[OwedToMe]) {
  println!("Owed to me ({})", bills.len());
  for bill in bills {
    let others = match bill.participant_count {
      0 | 1 => bill.participant_name.clone(),
      n => format!("{} +{}", bill.participant_name, n - 1),
    };
    println!(
      "  {:<28} {:>10}  due {:<10}  {}",
      bill.title,
      bill.total_amount,
      format_date(bill.due_date),
      others
    );
  }
}

fn print_i_owe(bills: &[IOwe]) {
  println!("I owe ({})", bills.len());
  for bill in bills {
    println!(
      "  {:<28} {:>10} of {:<10}  due {:<10}  to {}",
      bill.title,
      bill.amount_owed,
      bill.total_amount,
      format_date(bill.due_date),
      bill.participant_name
    );
  }
}

fn print_help() {
  for cmd in commands::COMMANDS {
    println!("  {:<8} {:<20} {}", cmd.name, cmd.aliases.join(", "), cmd.description);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_share_parses_email_and_amount() {
    let share: Share = "bo@example.com=12.50".parse().unwrap();
    assert_eq!(share.email, "bo@example.com");
    assert_eq!(share.amount.as_str(), "12.50");
  }

  #[test]
  fn test_share_rejects_bad_input() {
    assert!("bo@example.com".parse::<Share>().is_err());
    assert!("=12".parse::<Share>().is_err());
    assert!("bo@example.com=twelve".parse::<Share>().is_err());
  }

  #[test]
  fn test_parse_due_date() {
    assert_eq!(
      parse_due_date("2025-07-01").unwrap(),
      Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    );
    assert!(parse_due_date("07/01/2025").is_err());
  }

  #[test]
  fn test_edit_args_due_date_update() {
    let args = EditArgs {
      id: "b1".into(),
      title: None,
      total: None,
      due: None,
      clear_due: true,
      shares: Vec::new(),
    };
    assert_eq!(args.update().due_date, Some(None));

    let due = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    let args = EditArgs {
      due: Some(due),
      clear_due: false,
      ..args
    };
    assert_eq!(args.update().due_date, Some(Some(due)));
  }

  #[test]
  fn test_resolve_shares_uses_directory() {
    let users = vec![User {
      id: "u2".into(),
      email: "Bo@Example.com".into(),
      display_name: "Bo".into(),
    }];
    let shares = vec!["bo@example.com=5".parse::<Share>().unwrap()];

    let participants = App::resolve_shares(&users, &shares).unwrap();
    assert_eq!(participants[0].user_id, "u2");
    assert_eq!(participants[0].display_name, "Bo");

    let unknown = vec!["zed@example.com=5".parse::<Share>().unwrap()];
    assert!(App::resolve_shares(&users, &unknown).is_err());
  }
}
