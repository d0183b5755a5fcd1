//! Unix account store
//!
//! Identities and roles are rebuilt from the passwd, shadow and group tables
//! on every read. Mutations edit the rows and write them straight back.
//!
//! Every read first checks the backing files for changes under the shared
//! lock; readers run concurrently. A change is reloaded under the exclusive
//! lock, once. Writes hold the exclusive lock for their whole duration;
//! coordinating several processes that share the files is left to the
//! caller.

use crate::config::UnixStoreConfig;
use crate::error::{Result, StoreError};
use crate::lastlog::{CommandLastLogin, LastLoginSource, LastLogins};
use crate::schema::{self, SHADOWED, field, group, id_field, members, padded, passwd, shadow};
use crate::status::{ShadowAging, account_status, has_lock_prefix, password_status};
use chrono::NaiveDate;
use idbridge_common::{Clock, Identity, PasswordStatusType, Role, SystemClock};
use idbridge_crypt::{EncoderRegistry, EncodingError};
use idbridge_flatfile::{FileTable, Row};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Hash field of identities created without a password
const NO_PASSWORD: &str = "*";

/// Who is resetting a password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordResetType {
    /// An administrator; aging restrictions do not apply
    Administrative,
    /// The account owner; refused while the minimum age has not passed
    SelfService,
}

/// Attributes of an identity to create
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub name: String,
    /// Explicit uid; allocated when `None`
    pub uid: Option<u32>,
    /// Primary group; the configured default when `None`
    pub gid: Option<u32>,
    pub gecos: String,
    /// Home directory; `<home_base>/<name>` when `None`
    pub home: Option<String>,
    /// Login shell; the configured default when `None`
    pub shell: Option<String>,
    /// Initial password; the account cannot log in when `None`
    pub password: Option<String>,
}

impl NewIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Attribute changes of an existing identity; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
    pub gecos: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub gid: Option<u32>,
    pub min_days: Option<u32>,
    pub max_days: Option<u32>,
    pub warn_days: Option<u32>,
    pub inactive_days: Option<u32>,
}

impl IdentityUpdate {
    const fn touches_aging(&self) -> bool {
        self.min_days.is_some()
            || self.max_days.is_some()
            || self.warn_days.is_some()
            || self.inactive_days.is_some()
    }
}

/// Changes of an existing role
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub gid: Option<u32>,
    pub members: Option<Vec<String>>,
}

/// Loaded tables plus the member-to-groups lookup
#[derive(Debug)]
struct Tables {
    passwd: FileTable,
    shadow: Option<FileTable>,
    group: Option<FileTable>,
    /// Supplementary group names per member
    memberships: HashMap<String, Vec<String>>,
}

impl Tables {
    fn open(config: &UnixStoreConfig) -> Result<Self> {
        let passwd = FileTable::open(&config.passwd_file, schema::passwd_table(config), config.charset)?;
        let shadow = config
            .shadow_file
            .as_ref()
            .map(|path| FileTable::open(path, schema::shadow_table(config), config.charset))
            .transpose()?;
        let group = config
            .group_file
            .as_ref()
            .map(|path| FileTable::open(path, schema::group_table(config), config.charset))
            .transpose()?;

        let mut tables = Self {
            passwd,
            shadow,
            group,
            memberships: HashMap::new(),
        };
        tables.rebuild_memberships();
        Ok(tables)
    }

    fn is_stale(&self) -> Result<bool> {
        if self.passwd.is_stale()? {
            return Ok(true);
        }
        for table in [&self.shadow, &self.group].into_iter().flatten() {
            if table.is_stale()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reload_if_stale(&mut self) -> Result<()> {
        self.passwd.reload_if_stale()?;
        if let Some(shadow) = &mut self.shadow {
            shadow.reload_if_stale()?;
        }
        let group_reloaded = match &mut self.group {
            Some(group) => group.reload_if_stale()?,
            None => false,
        };
        if group_reloaded {
            self.rebuild_memberships();
        }
        Ok(())
    }

    fn rebuild_memberships(&mut self) {
        self.memberships.clear();
        let Some(group) = &self.group else {
            return;
        };
        for row in group.table().rows() {
            let name = field(row, group::NAME);
            for member in members(row) {
                self.memberships
                    .entry(member)
                    .or_default()
                    .push(name.to_string());
            }
        }
        tracing::debug!("Indexed memberships of {} principals", self.memberships.len());
    }

    fn group_table(&self) -> Result<&FileTable> {
        self.group
            .as_ref()
            .ok_or_else(|| StoreError::Unsupported("no group table configured".to_string()))
    }

    fn group_table_mut(&mut self) -> Result<&mut FileTable> {
        self.group
            .as_mut()
            .ok_or_else(|| StoreError::Unsupported("no group table configured".to_string()))
    }

    fn passwd_row(&self, name: &str) -> Result<&Row> {
        self.passwd
            .table()
            .get(passwd::NAME, name)
            .ok_or_else(|| StoreError::not_found(name))
    }

    fn shadow_row(&self, name: &str) -> Option<&Row> {
        self.shadow.as_ref()?.table().get(shadow::NAME, name)
    }

    /// Stored hash; from shadow when the identity has a shadow row
    fn live_hash(&self, name: &str) -> Option<&str> {
        match self.shadow_row(name) {
            Some(row) => Some(field(row, shadow::PASSWORD)),
            None => self
                .passwd
                .table()
                .get(passwd::NAME, name)
                .map(|row| field(row, passwd::PASSWORD)),
        }
    }

    fn identity(&self, row: &[String], today: NaiveDate, last_logins: Option<&LastLogins>) -> Result<Identity> {
        let name = field(row, passwd::NAME);
        let (Some(uid), Some(gid)) = (id_field(row, passwd::UID), id_field(row, passwd::GID)) else {
            return Err(StoreError::Format(format!("passwd entry of {name} has a malformed uid or gid")));
        };

        let mut identity = Identity::new(name, uid, gid);
        identity.gecos = field(row, passwd::GECOS).to_string();
        identity.home = field(row, passwd::HOME).to_string();
        identity.shell = field(row, passwd::SHELL).to_string();

        if let Some(group) = &self.group {
            identity.primary_group = group
                .table()
                .get(group::GID, &gid.to_string())
                .map(|g| field(g, group::NAME).to_string());
        }
        identity.groups = self.memberships.get(name).cloned().unwrap_or_default();

        let aging = match (&self.shadow, self.shadow_row(name)) {
            (Some(_), Some(shadow_row)) => Some(ShadowAging::from_row(shadow_row)),
            (Some(_), None) => {
                tracing::warn!("No shadow entry for {}, using default password status", name);
                None
            }
            (None, _) => None,
        };
        identity.password_status = aging.as_ref().map(|a| password_status(a, today));
        let live_hash = self.live_hash(name).unwrap_or_default();
        identity.account_status =
            account_status(live_hash, aging.as_ref(), identity.password_status.as_ref(), today);
        identity.last_login = last_logins.and_then(|logins| logins.get(name).copied().flatten());
        Ok(identity)
    }

    fn role(row: &[String]) -> Result<Role> {
        let name = field(row, group::NAME);
        let gid = id_field(row, group::GID)
            .ok_or_else(|| StoreError::Format(format!("group entry of {name} has a malformed gid")))?;
        let mut role = Role::new(name, gid);
        role.members = members(row);
        Ok(role)
    }

    /// Listed members plus identities whose primary group is `role`
    fn members_of(&self, role: &Role) -> Vec<String> {
        let mut names = role.members.clone();
        for row in self.passwd.table().rows() {
            let name = field(row, passwd::NAME);
            if id_field(row, passwd::GID) == Some(role.gid) && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Next id above every id in `column`, at least `first_id`
    fn next_id(table: &FileTable, column: usize, first_id: u32) -> Result<u32> {
        let max = table
            .table()
            .rows()
            .filter_map(|row| id_field(row, column))
            .max();
        match max {
            Some(max) => max
                .checked_add(1)
                .map(|id| id.max(first_id))
                .ok_or_else(|| StoreError::InvalidState(format!("no id left above {max}"))),
            None => Ok(first_id),
        }
    }

    /// Apply the aging part of an update to the shadow row of `name`
    fn update_aging(&mut self, name: &str, update: &IdentityUpdate) -> Result<()> {
        let Some(shadow_table) = &mut self.shadow else {
            return Ok(());
        };
        let Some(current) = shadow_table.table().get(shadow::NAME, name) else {
            return Ok(());
        };
        let mut row = padded(current, shadow::COLUMNS);
        for (column, value) in [
            (shadow::MIN_AGE, update.min_days),
            (shadow::MAX_AGE, update.max_days),
            (shadow::WARN, update.warn_days),
            (shadow::INACTIVE, update.inactive_days),
        ] {
            if let Some(days) = value {
                row[column] = days.to_string();
            }
        }
        shadow_table.replace(shadow::NAME, name, row)?;
        Ok(())
    }
}

/// Account store over passwd, shadow and group tables
#[derive(Debug)]
pub struct UnixAccountStore {
    config: UnixStoreConfig,
    registry: Arc<EncoderRegistry>,
    clock: Arc<dyn Clock>,
    last_login: Option<Arc<dyn LastLoginSource>>,
    state: RwLock<Option<Tables>>,
}

impl UnixAccountStore {
    /// Create a closed store
    ///
    /// A configured `lastlog_command` becomes the last-login source.
    pub fn new(config: UnixStoreConfig, registry: Arc<EncoderRegistry>) -> Self {
        let last_login = config
            .lastlog_command
            .as_deref()
            .map(|command| Arc::new(CommandLastLogin::new(command)) as Arc<dyn LastLoginSource>);
        Self {
            config,
            registry,
            clock: Arc::new(SystemClock),
            last_login,
            state: RwLock::new(None),
        }
    }

    /// Use another clock for "today"
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use another last-login source
    #[must_use]
    pub fn with_last_login(mut self, source: Arc<dyn LastLoginSource>) -> Self {
        self.last_login = Some(source);
        self
    }

    /// Store configuration
    #[must_use]
    pub const fn config(&self) -> &UnixStoreConfig {
        &self.config
    }

    /// Load all tables, discarding anything loaded before
    pub fn open(&self) -> Result<()> {
        let tables = Tables::open(&self.config)?;
        tracing::info!(
            "Opened account store at {} with {} identities",
            self.config.passwd_file.display(),
            tables.passwd.table().len()
        );
        *self.state.write() = Some(tables);
        Ok(())
    }

    /// Drop all loaded tables
    pub fn close(&self) {
        if self.state.write().take().is_some() {
            tracing::info!("Closed account store at {}", self.config.passwd_file.display());
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.read().is_some()
    }

    /// Run `f` on tables refreshed from disk
    ///
    /// Readers share the lock. A stale check takes the write lock for the
    /// reload; the writer that gets it first reloads and later ones find the
    /// tables fresh again.
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        let guard = self.state.read();
        let stale = match &*guard {
            Some(tables) => tables.is_stale()?,
            None => return Err(StoreError::Closed),
        };
        if !stale {
            return (*guard).as_ref().map_or(Err(StoreError::Closed), f);
        }
        drop(guard);

        let mut write = self.state.write();
        if let Some(tables) = &mut *write {
            tables.reload_if_stale()?;
        }
        let read = RwLockWriteGuard::downgrade(write);
        (*read).as_ref().map_or(Err(StoreError::Closed), f)
    }

    /// Run `f` on tables refreshed from disk, exclusively
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let Some(tables) = &mut *guard else {
            return Err(StoreError::Closed);
        };
        tables.reload_if_stale()?;
        f(tables)
    }

    /// Last logins, or `None` when unavailable
    fn last_logins(&self) -> Option<LastLogins> {
        let source = self.last_login.as_ref()?;
        match source.last_logins() {
            Ok(logins) => Some(logins),
            Err(e) => {
                tracing::warn!("Last-login data unavailable: {}", e);
                None
            }
        }
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        Ok(self.registry.encode_str(
            &self.config.password_algorithm,
            password,
            None,
            None,
            self.config.charset,
        )?)
    }

    // =========== Identity Operations ===========

    /// Get an identity by name
    pub fn get_identity(&self, name: &str) -> Result<Identity> {
        let logins = self.last_logins();
        let today = self.clock.today();
        self.read(|tables| tables.identity(tables.passwd_row(name)?, today, logins.as_ref()))
    }

    /// Get an identity by uid
    pub fn get_identity_by_id(&self, uid: u32) -> Result<Identity> {
        let logins = self.last_logins();
        let today = self.clock.today();
        self.read(|tables| {
            let row = tables
                .passwd
                .table()
                .get(passwd::UID, &uid.to_string())
                .ok_or_else(|| StoreError::not_found(format!("uid {uid}")))?;
            tables.identity(row, today, logins.as_ref())
        })
    }

    pub fn identity_exists(&self, name: &str) -> Result<bool> {
        self.read(|tables| Ok(tables.passwd.table().contains_key(passwd::NAME, name)))
    }

    /// List all identities in file order
    ///
    /// Rows with a malformed uid or gid are skipped.
    pub fn list_identities(&self) -> Result<Vec<Identity>> {
        let logins = self.last_logins();
        let today = self.clock.today();
        self.read(|tables| {
            let mut identities = Vec::with_capacity(tables.passwd.table().len());
            for row in tables.passwd.table().rows() {
                match tables.identity(row, today, logins.as_ref()) {
                    Ok(identity) => identities.push(identity),
                    Err(e) => tracing::warn!("Skipping passwd entry: {}", e),
                }
            }
            Ok(identities)
        })
    }

    /// Create an identity, with a shadow entry when shadow is in use
    pub fn create_identity(&self, new: NewIdentity) -> Result<Identity> {
        if new.name.is_empty() {
            return Err(StoreError::Format("identity name must not be empty".to_string()));
        }
        let hash = match &new.password {
            Some(password) => self.hash_password(password)?,
            None => NO_PASSWORD.to_string(),
        };
        let today = self.clock.today_days();

        self.write(|tables| {
            if tables.passwd.table().contains_key(passwd::NAME, &new.name) {
                return Err(StoreError::AlreadyExists(new.name.clone()));
            }
            let uid = match new.uid {
                Some(uid) if tables.passwd.table().contains_key(passwd::UID, &uid.to_string()) => {
                    return Err(StoreError::AlreadyExists(format!("uid {uid}")));
                }
                Some(uid) => uid,
                None => Tables::next_id(&tables.passwd, passwd::UID, self.config.first_id)?,
            };
            let gid = new.gid.unwrap_or(self.config.default_gid);
            let home = new.home.clone().unwrap_or_else(|| {
                format!("{}/{}", self.config.home_base.trim_end_matches('/'), new.name)
            });
            let shell = new.shell.clone().unwrap_or_else(|| self.config.default_shell.clone());
            let passwd_hash = if tables.shadow.is_some() { SHADOWED } else { hash.as_str() };

            tables.passwd.add(vec![
                new.name.clone(),
                passwd_hash.to_string(),
                uid.to_string(),
                gid.to_string(),
                new.gecos.clone(),
                home,
                shell,
            ])?;

            if let Some(shadow_table) = &mut tables.shadow {
                let shadow_row = vec![
                    new.name.clone(),
                    hash.clone(),
                    today.to_string(),
                    self.config.min_days.to_string(),
                    self.config.max_days.to_string(),
                    self.config.warn_days.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                ];
                if let Err(e) = shadow_table.add(shadow_row) {
                    tracing::warn!("Shadow entry for {} failed, removing passwd entry: {}", new.name, e);
                    tables.passwd.remove_by_key(passwd::NAME, &new.name)?;
                    return Err(e.into());
                }
            }
            tracing::info!("Created identity {} with uid {}", new.name, uid);
            Ok(())
        })?;

        self.get_identity(&new.name)
    }

    /// Update attributes and aging of an identity
    pub fn update_identity(&self, name: &str, update: IdentityUpdate) -> Result<Identity> {
        self.write(|tables| {
            let mut row = padded(tables.passwd_row(name)?, passwd::COLUMNS);
            if update.touches_aging() && tables.shadow_row(name).is_none() {
                return Err(if tables.shadow.is_some() {
                    StoreError::not_found(format!("shadow entry of {name}"))
                } else {
                    StoreError::Unsupported("password aging without a shadow table".to_string())
                });
            }

            if let Some(gecos) = &update.gecos {
                row[passwd::GECOS].clone_from(gecos);
            }
            if let Some(home) = &update.home {
                row[passwd::HOME].clone_from(home);
            }
            if let Some(shell) = &update.shell {
                row[passwd::SHELL].clone_from(shell);
            }
            if let Some(gid) = update.gid {
                row[passwd::GID] = gid.to_string();
            }
            let previous = tables.passwd.replace(passwd::NAME, name, row)?;

            if update.touches_aging() {
                if let Err(e) = tables.update_aging(name, &update) {
                    tracing::warn!("Shadow update of {} failed, restoring passwd entry: {}", name, e);
                    if let Some(previous) = previous {
                        tables.passwd.replace(passwd::NAME, name, previous)?;
                    }
                    return Err(e);
                }
            }
            tracing::debug!("Updated identity {}", name);
            Ok(())
        })?;

        self.get_identity(name)
    }

    /// Delete an identity's passwd entry
    ///
    /// Shadow and group entries naming it are left in place.
    pub fn delete_identity(&self, name: &str) -> Result<()> {
        self.write(|tables| {
            tables
                .passwd
                .remove_by_key(passwd::NAME, name)?
                .ok_or_else(|| StoreError::not_found(name))?;
            tracing::info!("Deleted identity {}", name);
            Ok(())
        })
    }

    /// Lock an identity
    pub fn lock_identity(&self, name: &str) -> Result<()> {
        self.set_locked(name, true)
    }

    /// Unlock an identity
    pub fn unlock_identity(&self, name: &str) -> Result<()> {
        self.set_locked(name, false)
    }

    /// Disable an identity; same effect as locking
    pub fn disable_identity(&self, name: &str) -> Result<()> {
        self.set_locked(name, true)
    }

    /// Enable an identity; same effect as unlocking
    pub fn enable_identity(&self, name: &str) -> Result<()> {
        self.set_locked(name, false)
    }

    fn set_locked(&self, name: &str, lock: bool) -> Result<()> {
        let today = self.clock.today();
        let today_days = self.clock.today_days();
        self.write(|tables| {
            let passwd_row = tables.passwd_row(name)?;
            let identity = tables.identity(passwd_row, today, None)?;
            match (lock, identity.account_status.locked) {
                (true, true) => return Err(StoreError::InvalidState(format!("{name} is already locked"))),
                (false, false) => return Err(StoreError::InvalidState(format!("{name} is not locked"))),
                _ => {}
            }

            let toggle = |hash: &str| {
                if lock {
                    if has_lock_prefix(hash) { hash.to_string() } else { format!("!{hash}") }
                } else {
                    hash.strip_prefix('!').unwrap_or(hash).to_string()
                }
            };

            if let Some(current) = tables.shadow_row(name) {
                let mut row = padded(current, shadow::COLUMNS);
                row[shadow::PASSWORD] = toggle(&row[shadow::PASSWORD]);
                row[shadow::DISABLED_SINCE] = if lock { today_days.to_string() } else { String::new() };
                if let Some(shadow_table) = &mut tables.shadow {
                    shadow_table.replace(shadow::NAME, name, row)?;
                }
            } else {
                let mut row = padded(tables.passwd_row(name)?, passwd::COLUMNS);
                row[passwd::PASSWORD] = toggle(&row[passwd::PASSWORD]);
                tables.passwd.replace(passwd::NAME, name, row)?;
            }
            tracing::info!("{} identity {}", if lock { "Locked" } else { "Unlocked" }, name);
            Ok(())
        })
    }

    /// Set a new password
    ///
    /// `force_change` makes the password expire at the next login. An
    /// existing lock survives the change.
    pub fn set_password(
        &self,
        name: &str,
        password: &str,
        force_change: bool,
        reset_type: PasswordResetType,
    ) -> Result<()> {
        let hash = self.hash_password(password)?;
        let today = self.clock.today();
        let last_change = if force_change { 0 } else { self.clock.today_days() };

        self.write(|tables| {
            let passwd_row = tables.passwd_row(name)?;
            if reset_type == PasswordResetType::SelfService {
                let identity = tables.identity(passwd_row, today, None)?;
                if identity.password_status.is_some_and(|s| s.status == PasswordStatusType::Locked) {
                    return Err(StoreError::PolicyViolation(format!(
                        "password of {name} is within its minimum age"
                    )));
                }
            }
            let locked = tables.live_hash(name).is_some_and(has_lock_prefix);
            let hash = if locked { format!("!{hash}") } else { hash.clone() };

            if tables.shadow.is_none() {
                if force_change {
                    return Err(StoreError::Unsupported(
                        "forcing a password change without a shadow table".to_string(),
                    ));
                }
                let mut row = padded(passwd_row, passwd::COLUMNS);
                row[passwd::PASSWORD] = hash;
                tables.passwd.replace(passwd::NAME, name, row)?;
                tracing::info!("Set password of {}", name);
                return Ok(());
            }

            let (exists, shadow_row) = match tables.shadow_row(name) {
                Some(current) => {
                    let mut row = padded(current, shadow::COLUMNS);
                    row[shadow::PASSWORD] = hash;
                    row[shadow::LAST_CHANGE] = last_change.to_string();
                    (true, row)
                }
                None => (
                    false,
                    vec![
                        name.to_string(),
                        hash,
                        last_change.to_string(),
                        self.config.min_days.to_string(),
                        self.config.max_days.to_string(),
                        self.config.warn_days.to_string(),
                        String::new(),
                        String::new(),
                        String::new(),
                    ],
                ),
            };
            let Some(shadow_table) = &mut tables.shadow else {
                return Ok(());
            };
            let previous = if exists {
                shadow_table.replace(shadow::NAME, name, shadow_row)?
            } else {
                tracing::debug!("Adding missing shadow entry for {}", name);
                shadow_table.add(shadow_row)?;
                None
            };

            let passwd_row = tables.passwd_row(name)?;
            if field(passwd_row, passwd::PASSWORD) != SHADOWED {
                let mut row = padded(passwd_row, passwd::COLUMNS);
                row[passwd::PASSWORD] = SHADOWED.to_string();
                if let Err(e) = tables.passwd.replace(passwd::NAME, name, row) {
                    tracing::warn!("Passwd update of {} failed, restoring shadow entry: {}", name, e);
                    if let Some(shadow_table) = &mut tables.shadow {
                        match previous {
                            Some(previous) => shadow_table.replace(shadow::NAME, name, previous)?,
                            None => shadow_table.remove_by_key(shadow::NAME, name)?,
                        };
                    }
                    return Err(e.into());
                }
            }
            tracing::info!("Set password of {}", name);
            Ok(())
        })
    }

    /// Check a password against the stored hash
    ///
    /// Locked or disabled identities, disabled-marker hashes and hashes no
    /// encoder recognises never match.
    pub fn are_credentials_valid(&self, name: &str, password: &str) -> Result<bool> {
        let today = self.clock.today();
        let hash = self.read(|tables| {
            let identity = tables.identity(tables.passwd_row(name)?, today, None)?;
            if !identity.account_status.is_active() {
                tracing::debug!("{} is {:?}, refusing credentials", name, identity.account_status.status);
                return Ok(None);
            }
            Ok(tables.live_hash(name).map(str::to_string))
        })?;

        let Some(hash) = hash else {
            return Ok(false);
        };
        if hash.is_empty() || hash == NO_PASSWORD || hash == SHADOWED || has_lock_prefix(&hash) {
            return Ok(false);
        }
        let plain = self.config.charset.encode(password).map_err(EncodingError::from)?;
        Ok(self.registry.verify(hash.as_bytes(), &plain, None)?)
    }

    // =========== Role Operations ===========

    /// Get a role by name
    pub fn get_role(&self, name: &str) -> Result<Role> {
        self.read(|tables| {
            let row = tables
                .group_table()?
                .table()
                .get(group::NAME, name)
                .ok_or_else(|| StoreError::not_found(name))?;
            Tables::role(row)
        })
    }

    /// Get a role by gid
    pub fn get_role_by_id(&self, gid: u32) -> Result<Role> {
        self.read(|tables| {
            let row = tables
                .group_table()?
                .table()
                .get(group::GID, &gid.to_string())
                .ok_or_else(|| StoreError::not_found(format!("gid {gid}")))?;
            Tables::role(row)
        })
    }

    /// List all roles in file order
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        self.read(|tables| {
            let mut roles = Vec::new();
            for row in tables.group_table()?.table().rows() {
                match Tables::role(row) {
                    Ok(role) => roles.push(role),
                    Err(e) => tracing::warn!("Skipping group entry: {}", e),
                }
            }
            Ok(roles)
        })
    }

    /// Names of all members of a role, primary members included
    pub fn members_of(&self, name: &str) -> Result<Vec<String>> {
        self.read(|tables| {
            let row = tables
                .group_table()?
                .table()
                .get(group::NAME, name)
                .ok_or_else(|| StoreError::not_found(name))?;
            Ok(tables.members_of(&Tables::role(row)?))
        })
    }

    /// Create a role; the gid is allocated when `None`
    pub fn create_role(&self, name: &str, gid: Option<u32>, members: Vec<String>) -> Result<Role> {
        if name.is_empty() {
            return Err(StoreError::Format("role name must not be empty".to_string()));
        }
        self.write(|tables| {
            let first_id = self.config.first_id;
            let group_table = tables.group_table_mut()?;
            if group_table.table().contains_key(group::NAME, name) {
                return Err(StoreError::AlreadyExists(name.to_string()));
            }
            let gid = match gid {
                Some(gid) if group_table.table().contains_key(group::GID, &gid.to_string()) => {
                    return Err(StoreError::AlreadyExists(format!("gid {gid}")));
                }
                Some(gid) => gid,
                None => Tables::next_id(group_table, group::GID, first_id)?,
            };
            group_table.add(vec![
                name.to_string(),
                SHADOWED.to_string(),
                gid.to_string(),
                members.join(","),
            ])?;
            tables.rebuild_memberships();
            tracing::info!("Created role {} with gid {}", name, gid);
            Ok(())
        })?;
        self.get_role(name)
    }

    /// Change the gid or member list of a role
    pub fn update_role(&self, name: &str, update: RoleUpdate) -> Result<Role> {
        self.write(|tables| {
            let group_table = tables.group_table_mut()?;
            let current = group_table
                .table()
                .get(group::NAME, name)
                .ok_or_else(|| StoreError::not_found(name))?;
            let mut row = padded(current, group::COLUMNS);
            if let Some(gid) = update.gid {
                let key = gid.to_string();
                let taken = group_table
                    .table()
                    .get(group::GID, &key)
                    .is_some_and(|other| field(other, group::NAME) != name);
                if taken {
                    return Err(StoreError::AlreadyExists(format!("gid {gid}")));
                }
                row[group::GID] = key;
            }
            if let Some(members) = &update.members {
                row[group::MEMBERS] = members.join(",");
            }
            group_table.replace(group::NAME, name, row)?;
            tables.rebuild_memberships();
            tracing::debug!("Updated role {}", name);
            Ok(())
        })?;
        self.get_role(name)
    }

    /// Delete a role
    pub fn delete_role(&self, name: &str) -> Result<()> {
        self.write(|tables| {
            tables
                .group_table_mut()?
                .remove_by_key(group::NAME, name)?
                .ok_or_else(|| StoreError::not_found(name))?;
            tables.rebuild_memberships();
            tracing::info!("Deleted role {}", name);
            Ok(())
        })
    }

    /// Add a supplementary member; returns false if it already was one
    pub fn add_member(&self, role: &str, member: &str) -> Result<bool> {
        self.write(|tables| {
            if !tables.passwd.table().contains_key(passwd::NAME, member) {
                return Err(StoreError::not_found(member));
            }
            Self::edit_members(tables, role, |members| {
                if members.iter().any(|m| m == member) {
                    return false;
                }
                members.push(member.to_string());
                true
            })
        })
    }

    /// Remove a supplementary member; returns false if it was not one
    pub fn remove_member(&self, role: &str, member: &str) -> Result<bool> {
        self.write(|tables| {
            Self::edit_members(tables, role, |members| {
                let before = members.len();
                members.retain(|m| m != member);
                members.len() != before
            })
        })
    }

    fn edit_members(
        tables: &mut Tables,
        role: &str,
        edit: impl FnOnce(&mut Vec<String>) -> bool,
    ) -> Result<bool> {
        let group_table = tables.group_table_mut()?;
        let current = group_table
            .table()
            .get(group::NAME, role)
            .ok_or_else(|| StoreError::not_found(role))?;
        let mut list = members(current);
        if !edit(&mut list) {
            return Ok(false);
        }
        let mut row = padded(current, group::COLUMNS);
        row[group::MEMBERS] = list.join(",");
        group_table.replace(group::NAME, role, row)?;
        tables.rebuild_memberships();
        tracing::debug!("Updated members of {}", role);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lastlog::LastLoginError;
    use chrono::DateTime;
    use idbridge_common::{AccountStatusType, FixedClock, date_from_days};
    use std::fs::{self, OpenOptions};
    use std::path::Path;
    use std::time::{Duration, Instant, SystemTime};

    const TODAY: i64 = 18010;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
alice:x:1000:1000:Alice:/home/alice:/bin/sh
bob:x:1001:100:Bob:/home/bob:/bin/sh
";

    const SHADOW: &str = "\
root:*:18000:0:99999:7:::
alice:$6$abc$xyz:18000:0:90:7:::
bob:!$1$salt$hash:18000:0:99999:7:::
";

    const GROUP: &str = "\
root:x:0:
users:x:100:
alice:x:1000:
wheel:x:10:alice,bob
";

    #[derive(Debug)]
    struct StubLogins(LastLogins);

    impl LastLoginSource for StubLogins {
        fn last_logins(&self) -> std::result::Result<LastLogins, LastLoginError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct FailingLogins;

    impl LastLoginSource for FailingLogins {
        fn last_logins(&self) -> std::result::Result<LastLogins, LastLoginError> {
            Err(LastLoginError::Exit {
                command: "lastlog".to_string(),
                status: "exit status: 1".to_string(),
            })
        }
    }

    fn write_tables(dir: &Path) {
        fs::write(dir.join("passwd"), PASSWD).unwrap();
        fs::write(dir.join("shadow"), SHADOW).unwrap();
        fs::write(dir.join("group"), GROUP).unwrap();
    }

    fn registry() -> Arc<EncoderRegistry> {
        Arc::new(EncoderRegistry::new())
    }

    fn open_with(config: UnixStoreConfig) -> UnixAccountStore {
        let store = UnixAccountStore::new(config, registry()).with_clock(Arc::new(FixedClock::from_days(TODAY)));
        store.open().unwrap();
        store
    }

    fn open(dir: &Path) -> UnixAccountStore {
        open_with(UnixStoreConfig {
            password_algorithm: "MD5CRYPT".to_string(),
            ..UnixStoreConfig::in_dir(dir)
        })
    }

    fn shadow_line(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join("shadow"))
            .unwrap()
            .lines()
            .find(|l| l.starts_with(&format!("{name}:")))
            .unwrap()
            .to_string()
    }

    fn touch_future(path: &Path) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_identity_from_joined_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let alice = store.get_identity("alice").unwrap();
        assert_eq!(alice.uid, 1000);
        assert_eq!(alice.home, "/home/alice");
        assert_eq!(alice.primary_group.as_deref(), Some("alice"));
        assert_eq!(alice.groups, vec!["wheel"]);

        let status = alice.password_status.unwrap();
        assert_eq!(status.expire, date_from_days(18090));
        assert_eq!(status.status, PasswordStatusType::UpToDate);
        assert_eq!(alice.account_status.status, AccountStatusType::Active);

        let by_id = store.get_identity_by_id(1001).unwrap();
        assert_eq!(by_id.name, "bob");
        assert_eq!(by_id.primary_group.as_deref(), Some("users"));
        assert!(store.get_identity("carol").unwrap_err().is_not_found());
        assert!(store.get_identity_by_id(4242).unwrap_err().is_not_found());
        assert_eq!(store.list_identities().unwrap().len(), 3);
    }

    #[test]
    fn test_lock_prefix_reports_locked() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let bob = store.get_identity("bob").unwrap();
        assert!(bob.is_locked());
        assert_eq!(bob.account_status.status, AccountStatusType::Locked);
        assert!(matches!(store.lock_identity("bob"), Err(StoreError::InvalidState(_))));
    }

    #[test]
    fn test_lock_and_unlock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        store.lock_identity("alice").unwrap();
        assert_eq!(shadow_line(dir.path(), "alice"), "alice:!$6$abc$xyz:18000:0:90:7::18010:");
        let alice = store.get_identity("alice").unwrap();
        assert!(alice.is_locked());
        assert_eq!(alice.account_status.locked_since, date_from_days(TODAY));

        store.unlock_identity("alice").unwrap();
        assert_eq!(shadow_line(dir.path(), "alice"), "alice:$6$abc$xyz:18000:0:90:7:::");
        assert!(matches!(store.enable_identity("alice"), Err(StoreError::InvalidState(_))));

        store.disable_identity("alice").unwrap();
        assert!(store.get_identity("alice").unwrap().is_locked());
    }

    #[test]
    fn test_lock_without_shadow_uses_passwd_field() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("passwd"), "carol:$1$salt$hash:1002:100::/home/carol:/bin/sh\n").unwrap();
        let store = open_with(UnixStoreConfig {
            passwd_file: dir.path().join("passwd"),
            shadow_file: None,
            group_file: None,
            ..UnixStoreConfig::default()
        });

        store.lock_identity("carol").unwrap();
        assert!(fs::read_to_string(dir.path().join("passwd")).unwrap().starts_with("carol:!$1$salt$hash:"));
        let carol = store.get_identity("carol").unwrap();
        assert!(carol.is_locked());
        assert!(carol.password_status.is_none());
        assert!(matches!(store.list_roles(), Err(StoreError::Unsupported(_))));
    }

    #[test]
    fn test_create_identity_allocates_next_uid() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let mut new = NewIdentity::new("carol");
        new.password = Some("s3cret".to_string());
        let carol = store.create_identity(new).unwrap();
        assert_eq!(carol.uid, 1002);
        assert_eq!(carol.gid, 100);
        assert_eq!(carol.home, "/home/carol");
        assert_eq!(carol.shell, "/bin/sh");

        let passwd = fs::read_to_string(dir.path().join("passwd")).unwrap();
        assert!(passwd.ends_with("carol:x:1002:100::/home/carol:/bin/sh\n"));
        let shadow = shadow_line(dir.path(), "carol");
        assert!(shadow.starts_with("carol:$1$"));
        assert!(shadow.ends_with(":18010:0:99999:7:::"));
        assert!(store.are_credentials_valid("carol", "s3cret").unwrap());

        assert!(matches!(
            store.create_identity(NewIdentity::new("carol")),
            Err(StoreError::AlreadyExists(_))
        ));
        let mut clash = NewIdentity::new("dave");
        clash.uid = Some(1000);
        assert!(matches!(store.create_identity(clash), Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_create_identity_without_password_cannot_log_in() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        store.create_identity(NewIdentity::new("svc")).unwrap();
        assert!(shadow_line(dir.path(), "svc").starts_with("svc:*:"));
        assert!(!store.are_credentials_valid("svc", "").unwrap());
        assert!(!store.are_credentials_valid("svc", "*").unwrap());
    }

    #[test]
    fn test_set_password_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        store
            .set_password("alice", "hunter2", false, PasswordResetType::Administrative)
            .unwrap();
        let line = shadow_line(dir.path(), "alice");
        assert!(line.starts_with("alice:$1$"));
        assert!(line.contains(":18010:0:90:7:"));
        assert!(store.are_credentials_valid("alice", "hunter2").unwrap());
        assert!(!store.are_credentials_valid("alice", "hunter3").unwrap());

        store.set_password("alice", "hunter2", true, PasswordResetType::Administrative).unwrap();
        let status = store.get_identity("alice").unwrap().password_status.unwrap();
        assert_eq!(status.status, PasswordStatusType::NeedsChange);
    }

    #[test]
    fn test_set_password_keeps_lock() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        store.set_password("bob", "pw", false, PasswordResetType::Administrative).unwrap();
        assert!(shadow_line(dir.path(), "bob").starts_with("bob:!$1$"));
        assert!(store.get_identity("bob").unwrap().is_locked());
        assert!(!store.are_credentials_valid("bob", "pw").unwrap());

        store.unlock_identity("bob").unwrap();
        assert!(store.are_credentials_valid("bob", "pw").unwrap());
    }

    #[test]
    fn test_self_service_respects_minimum_age() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let update = IdentityUpdate {
            min_days: Some(5),
            ..IdentityUpdate::default()
        };
        store.update_identity("alice", update).unwrap();
        store.set_password("alice", "first", false, PasswordResetType::Administrative).unwrap();

        let err = store
            .set_password("alice", "second", false, PasswordResetType::SelfService)
            .unwrap_err();
        assert!(matches!(err, StoreError::PolicyViolation(_)));
        store.set_password("alice", "second", false, PasswordResetType::Administrative).unwrap();
        assert!(store.are_credentials_valid("alice", "second").unwrap());
    }

    #[test]
    fn test_update_and_delete_identity() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let update = IdentityUpdate {
            shell: Some("/bin/zsh".to_string()),
            max_days: Some(30),
            inactive_days: Some(10),
            ..IdentityUpdate::default()
        };
        let alice = store.update_identity("alice", update).unwrap();
        assert_eq!(alice.shell, "/bin/zsh");
        let status = alice.password_status.unwrap();
        assert_eq!(status.expire, date_from_days(18030));
        assert_eq!(status.disable, date_from_days(18040));
        assert_eq!(shadow_line(dir.path(), "alice"), "alice:$6$abc$xyz:18000:0:30:7:10::");

        store.delete_identity("alice").unwrap();
        assert!(!store.identity_exists("alice").unwrap());
        assert!(store.delete_identity("alice").unwrap_err().is_not_found());
        // Shadow entries are not cascaded.
        assert!(fs::read_to_string(dir.path().join("shadow")).unwrap().contains("alice:"));
    }

    #[test]
    fn test_failed_shadow_update_restores_passwd() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        // The temporary file cannot be created over a directory.
        fs::create_dir(dir.path().join(".shadow.tmp")).unwrap();
        let update = IdentityUpdate {
            shell: Some("/bin/zsh".to_string()),
            max_days: Some(30),
            ..IdentityUpdate::default()
        };
        assert!(store.update_identity("alice", update).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("passwd")).unwrap(), PASSWD);
        assert_eq!(store.get_identity("alice").unwrap().shell, "/bin/sh");
        assert_eq!(shadow_line(dir.path(), "alice"), "alice:$6$abc$xyz:18000:0:90:7:::");
    }

    #[test]
    fn test_failed_passwd_update_restores_shadow() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let passwd = format!(
            "{}carol:$1$old$hash:1002:100::/home/carol:/bin/sh\n",
            PASSWD.replace("alice:x:", "alice:$1$old$hash:")
        );
        fs::write(dir.path().join("passwd"), &passwd).unwrap();
        let store = open(dir.path());

        fs::create_dir(dir.path().join(".passwd.tmp")).unwrap();
        assert!(store.set_password("alice", "new", false, PasswordResetType::Administrative).is_err());
        assert_eq!(shadow_line(dir.path(), "alice"), "alice:$6$abc$xyz:18000:0:90:7:::");

        // carol had no shadow entry; the one added for her is taken out again.
        assert!(store.set_password("carol", "new", false, PasswordResetType::Administrative).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("shadow")).unwrap(), SHADOW);
        assert_eq!(fs::read_to_string(dir.path().join("passwd")).unwrap(), passwd);
    }

    #[test]
    fn test_id_allocation_stops_at_the_top() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        fs::write(
            dir.path().join("passwd"),
            format!("{PASSWD}last:x:4294967295:100::/:/bin/sh\n"),
        )
        .unwrap();
        fs::write(dir.path().join("group"), format!("{GROUP}last:x:4294967295:\n")).unwrap();
        let store = open(dir.path());

        assert!(matches!(
            store.create_identity(NewIdentity::new("carol")),
            Err(StoreError::InvalidState(_))
        ));
        assert!(!store.identity_exists("carol").unwrap());
        assert!(matches!(
            store.create_role("staff", None, Vec::new()),
            Err(StoreError::InvalidState(_))
        ));

        let mut carol = NewIdentity::new("carol");
        carol.uid = Some(2000);
        assert_eq!(store.create_identity(carol).unwrap().uid, 2000);
    }

    #[test]
    fn test_readers_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                store
                    .read(|_| {
                        started_tx.send(()).unwrap();
                        std::thread::sleep(Duration::from_millis(500));
                        Ok(())
                    })
                    .unwrap();
            });
            started_rx.recv().unwrap();

            let start = Instant::now();
            assert_eq!(store.get_identity("alice").unwrap().uid, 1000);
            assert!(start.elapsed() < Duration::from_millis(400));
        });
    }

    #[test]
    fn test_missing_shadow_entry_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        fs::write(dir.path().join("shadow"), "root:*:18000:0:99999:7:::\n").unwrap();
        let store = open(dir.path());

        let alice = store.get_identity("alice").unwrap();
        assert!(alice.password_status.is_none());
        assert!(alice.account_status.is_active());
    }

    #[test]
    fn test_roles_and_memberships() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let wheel = store.get_role("wheel").unwrap();
        assert_eq!(wheel.gid, 10);
        assert_eq!(wheel.members, vec!["alice", "bob"]);
        assert_eq!(store.get_role_by_id(100).unwrap().name, "users");
        assert_eq!(store.members_of("users").unwrap(), vec!["bob"]);
        assert_eq!(store.list_roles().unwrap().len(), 4);

        let staff = store.create_role("staff", None, vec!["alice".to_string()]).unwrap();
        assert_eq!(staff.gid, 1001);
        assert!(store.get_identity("alice").unwrap().is_member_of("staff"));

        assert!(store.add_member("staff", "bob").unwrap());
        assert!(!store.add_member("staff", "bob").unwrap());
        assert!(store.add_member("staff", "nobody").unwrap_err().is_not_found());
        assert!(store.remove_member("staff", "alice").unwrap());
        assert!(!store.remove_member("staff", "alice").unwrap());
        assert_eq!(store.get_identity("bob").unwrap().groups, vec!["wheel", "staff"]);

        let update = RoleUpdate {
            gid: Some(10),
            members: None,
        };
        assert!(matches!(store.update_role("staff", update), Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_delete_role_clears_both_indexes() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        store.delete_role("wheel").unwrap();
        assert!(store.get_role("wheel").unwrap_err().is_not_found());
        assert!(store.get_role_by_id(10).unwrap_err().is_not_found());
        assert!(store.get_identity("alice").unwrap().groups.is_empty());
        assert!(!fs::read_to_string(dir.path().join("group")).unwrap().contains("wheel"));
    }

    #[test]
    fn test_external_change_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let store = open(dir.path());

        let group_path = dir.path().join("group");
        fs::write(&group_path, format!("{GROUP}ops:x:20:alice\n")).unwrap();
        touch_future(&group_path);

        assert_eq!(store.get_identity("alice").unwrap().groups, vec!["wheel", "ops"]);
    }

    #[test]
    fn test_open_close_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnixAccountStore::new(UnixStoreConfig::in_dir(dir.path()), registry());
        assert!(matches!(store.open(), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.get_identity("alice"), Err(StoreError::Closed)));

        write_tables(dir.path());
        store.open().unwrap();
        assert!(store.is_open());
        store.close();
        assert!(!store.is_open());
        assert!(matches!(store.list_identities(), Err(StoreError::Closed)));

        store.open().unwrap();
        assert_eq!(store.list_identities().unwrap().len(), 3);
    }

    #[test]
    fn test_last_login_enrichment() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        let seen = DateTime::parse_from_rfc3339("2024-03-04T10:12:33+00:00").unwrap();
        let logins = LastLogins::from([("alice".to_string(), Some(seen)), ("bob".to_string(), None)]);
        let store = UnixAccountStore::new(UnixStoreConfig::in_dir(dir.path()), registry())
            .with_clock(Arc::new(FixedClock::from_days(TODAY)))
            .with_last_login(Arc::new(StubLogins(logins)));
        store.open().unwrap();

        assert_eq!(store.get_identity("alice").unwrap().last_login, Some(seen));
        assert_eq!(store.get_identity("bob").unwrap().last_login, None);

        let failing = UnixAccountStore::new(UnixStoreConfig::in_dir(dir.path()), registry())
            .with_last_login(Arc::new(FailingLogins));
        failing.open().unwrap();
        assert_eq!(failing.get_identity("alice").unwrap().last_login, None);
    }
}
