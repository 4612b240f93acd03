//! Text-coded enums shared by the daemon and its clients.
//!
//! Every enum here has a fixed wire text (`as_str`, `FromStr`, `Display`)
//! and serializes as that text.

/// Declares a fieldless enum together with its wire text.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($kind:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $text:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the wire text for this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl $crate::bitfield::TextEnum for $name {
            const KIND: &'static str = $kind;

            fn all() -> &'static [Self] {
                Self::ALL
            }

            fn text(self) -> &'static str {
                self.as_str()
            }

            fn from_text(text: &str) -> Option<Self> {
                match text {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn position(self) -> u32 {
                self as u32
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$name as $crate::bitfield::TextEnum>::from_text(s)
                    .ok_or_else(|| $crate::error::CoreError::unknown_value($kind, s))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let text = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                text.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use text_enum;

text_enum! {
    /// The operation a transaction performs.
    pub enum Role("role") {
        /// Not set yet.
        Unknown = "unknown",
        /// Cancel a running transaction.
        Cancel = "cancel",
        /// Dependencies of packages.
        GetDepends = "get-depends",
        /// Long descriptions of packages.
        GetDetails = "get-details",
        /// File lists of packages.
        GetFiles = "get-files",
        /// Every package matching a filter.
        GetPackages = "get-packages",
        /// Configured repositories.
        GetRepoList = "get-repo-list",
        /// Reverse dependencies of packages.
        GetRequires = "get-requires",
        /// Update descriptions.
        GetUpdateDetail = "get-update-detail",
        /// Available updates.
        GetUpdates = "get-updates",
        /// Install local package files.
        InstallFiles = "install-files",
        /// Install packages from repositories.
        InstallPackages = "install-packages",
        /// Import a repository signing key.
        InstallSignature = "install-signature",
        /// Refresh repository metadata.
        RefreshCache = "refresh-cache",
        /// Remove packages.
        RemovePackages = "remove-packages",
        /// Enable or disable a repository.
        RepoEnable = "repo-enable",
        /// Change a repository parameter.
        RepoSetData = "repo-set-data",
        /// Map package names to package ids.
        Resolve = "resolve",
        /// Undo an earlier transaction.
        Rollback = "rollback",
        /// Search package descriptions.
        SearchDetails = "search-details",
        /// Search by owned file.
        SearchFile = "search-file",
        /// Search by group.
        SearchGroup = "search-group",
        /// Search by name.
        SearchName = "search-name",
        /// Update named packages.
        UpdatePackages = "update-packages",
        /// Update every package.
        UpdateSystem = "update-system",
        /// Find packages providing a capability.
        WhatProvides = "what-provides",
        /// Accept a license agreement.
        AcceptEula = "accept-eula",
        /// Download packages without installing.
        DownloadPackages = "download-packages",
        /// Available distribution upgrades.
        GetDistroUpgrades = "get-distro-upgrades",
        /// Package categories.
        GetCategories = "get-categories",
        /// History from the transaction ledger.
        GetOldTransactions = "get-old-transactions",
        /// Dry run of `InstallFiles`.
        SimulateInstallFiles = "simulate-install-files",
        /// Dry run of `InstallPackages`.
        SimulateInstallPackages = "simulate-install-packages",
        /// Dry run of `RemovePackages`.
        SimulateRemovePackages = "simulate-remove-packages",
        /// Dry run of `UpdatePackages`.
        SimulateUpdatePackages = "simulate-update-packages",
        /// Policy pseudo-role guarding the daemon proxy settings.
        SetProxyPrivate = "set-proxy-private",
    }
}

impl Role {
    /// Roles that change what is installed on the system.
    pub fn is_system_modifying(self) -> bool {
        matches!(
            self,
            Role::InstallFiles
                | Role::InstallPackages
                | Role::RemovePackages
                | Role::UpdatePackages
                | Role::UpdateSystem
                | Role::Rollback
        )
    }

    /// Dry-run roles.
    pub fn is_simulate(self) -> bool {
        matches!(
            self,
            Role::SimulateInstallFiles
                | Role::SimulateInstallPackages
                | Role::SimulateRemovePackages
                | Role::SimulateUpdatePackages
        )
    }

    /// Roles that must pass the policy predicate before they are committed.
    pub fn requires_authorization(self) -> bool {
        matches!(
            self,
            Role::InstallFiles
                | Role::InstallPackages
                | Role::InstallSignature
                | Role::RefreshCache
                | Role::RemovePackages
                | Role::RepoEnable
                | Role::RepoSetData
                | Role::Rollback
                | Role::UpdatePackages
                | Role::UpdateSystem
                | Role::AcceptEula
                | Role::SetProxyPrivate
        )
    }

    /// Roles of which at most one unfinished transaction may exist.
    pub fn is_single_instance(self) -> bool {
        matches!(self, Role::UpdateSystem | Role::GetCategories)
    }

    /// Roles recorded in the transaction ledger.
    pub fn is_recorded(self) -> bool {
        matches!(
            self,
            Role::UpdateSystem | Role::RemovePackages | Role::InstallPackages | Role::UpdatePackages
        )
    }

    /// Roles whose success changes the repository list.
    pub fn changes_repo_list(self) -> bool {
        matches!(self, Role::RepoEnable | Role::RepoSetData)
    }

    /// Roles whose success makes the cached update list stale.
    pub fn invalidates_updates(self) -> bool {
        matches!(
            self,
            Role::UpdateSystem | Role::UpdatePackages | Role::RepoEnable | Role::RepoSetData
        )
    }
}

text_enum! {
    /// What the running transaction is currently doing.
    pub enum Status("status") {
        /// Not known.
        Unknown = "unknown",
        /// Queued behind another transaction.
        Wait = "wait",
        /// Being prepared to run.
        Setup = "setup",
        /// Running.
        Running = "running",
        /// Querying.
        Query = "query",
        /// Getting information.
        Info = "info",
        /// Removing packages.
        Remove = "remove",
        /// Refreshing the cache.
        RefreshCache = "refresh-cache",
        /// Downloading.
        Download = "download",
        /// Installing.
        Install = "install",
        /// Updating.
        Update = "update",
        /// Cleaning up.
        Cleanup = "cleanup",
        /// Obsoleting packages.
        Obsolete = "obsolete",
        /// Resolving dependencies.
        DepResolve = "dep-resolve",
        /// Checking signatures.
        SigCheck = "sig-check",
        /// Rolling back.
        Rollback = "rollback",
        /// Testing the changes.
        TestCommit = "test-commit",
        /// Committing the changes.
        Commit = "commit",
        /// Requesting data.
        Request = "request",
        /// Finished.
        Finished = "finished",
        /// Being cancelled.
        Cancel = "cancel",
        /// Downloading repository data.
        DownloadRepository = "download-repository",
        /// Downloading the package list.
        DownloadPackagelist = "download-packagelist",
        /// Downloading file lists.
        DownloadFilelist = "download-filelist",
        /// Downloading changelogs.
        DownloadChangelog = "download-changelog",
        /// Downloading groups.
        DownloadGroup = "download-group",
        /// Downloading update information.
        DownloadUpdateinfo = "download-updateinfo",
        /// Repackaging files.
        Repackaging = "repackaging",
        /// Loading the cache.
        LoadingCache = "loading-cache",
        /// Scanning applications.
        ScanApplications = "scan-applications",
        /// Generating package lists.
        GeneratePackageList = "generate-package-list",
        /// Waiting for a package manager lock.
        WaitingForLock = "waiting-for-lock",
    }
}

text_enum! {
    /// Final classification of a finished transaction.
    pub enum Exit("exit") {
        /// Not decided yet.
        Unknown = "unknown",
        /// Completed.
        Success = "success",
        /// Failed with an error.
        Failed = "failed",
        /// Cancelled by a client.
        Cancelled = "cancelled",
        /// A repository key must be accepted first.
        KeyRequired = "key-required",
        /// A license agreement must be accepted first.
        EulaRequired = "eula-required",
    }
}

text_enum! {
    /// Kind of a package result.
    pub enum Info("info") {
        /// Not known.
        Unknown = "unknown",
        /// Installed on the system.
        Installed = "installed",
        /// Available from a repository.
        Available = "available",
        /// Low priority update.
        Low = "low",
        /// Enhancement update.
        Enhancement = "enhancement",
        /// Normal update.
        Normal = "normal",
        /// Bug fix update.
        Bugfix = "bugfix",
        /// Important update.
        Important = "important",
        /// Security update.
        Security = "security",
        /// Update that cannot be applied.
        Blocked = "blocked",
        /// Being downloaded.
        Downloading = "downloading",
        /// Being updated.
        Updating = "updating",
        /// Being installed.
        Installing = "installing",
        /// Being removed.
        Removing = "removing",
        /// Being cleaned up.
        Cleanup = "cleanup",
        /// Being obsoleted.
        Obsoleting = "obsoleting",
        /// Installed collection.
        CollectionInstalled = "collection-installed",
        /// Available collection.
        CollectionAvailable = "collection-available",
        /// Processing of the package has finished.
        Finished = "finished",
        /// Being reinstalled.
        Reinstalling = "reinstalling",
        /// Being downgraded.
        Downgrading = "downgrading",
        /// Being prepared.
        Preparing = "preparing",
        /// Being decompressed.
        Decompressing = "decompressing",
    }
}

impl Info {
    /// Infos describing work in progress on a package, which are closed
    /// with a `finished` package when the next info for the same id arrives.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Info::Downloading
                | Info::Updating
                | Info::Installing
                | Info::Removing
                | Info::Cleanup
                | Info::Obsoleting
                | Info::Reinstalling
                | Info::Downgrading
        )
    }

    /// Status implied by emitting a package with this info.
    pub fn implied_status(self) -> Option<Status> {
        match self {
            Info::Downloading => Some(Status::Download),
            Info::Updating => Some(Status::Update),
            Info::Installing => Some(Status::Install),
            Info::Removing => Some(Status::Remove),
            Info::Cleanup => Some(Status::Cleanup),
            Info::Obsoleting => Some(Status::Obsolete),
            _ => None,
        }
    }
}

text_enum! {
    /// Operational error reported by a backend.
    pub enum ErrorCode("error code") {
        /// Not known.
        Unknown = "unknown",
        /// Out of memory.
        Oom = "out-of-memory",
        /// No network connection.
        NoNetwork = "no-network",
        /// Operation not supported.
        NotSupported = "not-supported",
        /// Internal error.
        InternalError = "internal-error",
        /// Signature verification failed.
        GpgFailure = "gpg-failure",
        /// Malformed package id.
        PackageIdInvalid = "package-id-invalid",
        /// Package is not installed.
        PackageNotInstalled = "package-not-installed",
        /// Package could not be found.
        PackageNotFound = "package-not-found",
        /// Package is already installed.
        PackageAlreadyInstalled = "package-already-installed",
        /// Package download failed.
        PackageDownloadFailed = "package-download-failed",
        /// Group could not be found.
        GroupNotFound = "group-not-found",
        /// Group list is invalid.
        GroupListInvalid = "group-list-invalid",
        /// Dependencies could not be resolved.
        DepResolutionFailed = "dep-resolution-failed",
        /// Filter is invalid.
        FilterInvalid = "filter-invalid",
        /// Worker thread could not be started.
        CreateThreadFailed = "create-thread-failed",
        /// Package manager transaction failed.
        TransactionError = "transaction-error",
        /// Transaction was cancelled.
        TransactionCancelled = "transaction-cancelled",
        /// No package cache available.
        NoCache = "no-cache",
        /// Repository not found.
        RepoNotFound = "repo-not-found",
        /// A system package cannot be removed.
        CannotRemoveSystemPackage = "cannot-remove-system-package",
        /// The backend process was killed.
        ProcessKill = "process-kill",
        /// Backend initialization failed.
        FailedInitialization = "failed-initialization",
        /// Backend finalization failed.
        FailedFinalise = "failed-finalise",
        /// Configuration could not be parsed.
        FailedConfigParsing = "failed-config-parsing",
        /// Transaction cannot be cancelled.
        CannotCancel = "cannot-cancel",
        /// Package manager lock could not be taken.
        CannotGetLock = "cannot-get-lock",
        /// Nothing to update.
        NoPackagesToUpdate = "no-packages-to-update",
        /// Repository configuration could not be written.
        CannotWriteRepoConfig = "cannot-write-repo-config",
        /// Local install failed.
        LocalInstallFailed = "local-install-failed",
        /// Bad signature.
        BadGpgSignature = "bad-gpg-signature",
        /// Missing signature.
        MissingGpgSignature = "missing-gpg-signature",
        /// Source packages cannot be installed.
        CannotInstallSourcePackage = "cannot-install-source-package",
        /// Repository configuration is broken.
        RepoConfigurationError = "repo-configuration-error",
        /// License agreement was not accepted.
        NoLicenseAgreement = "no-license-agreement",
        /// Files conflict.
        FileConflicts = "file-conflicts",
        /// Packages conflict.
        PackageConflicts = "package-conflicts",
        /// Repository not available.
        RepoNotAvailable = "repo-not-available",
        /// Package file is invalid.
        InvalidPackageFile = "invalid-package-file",
        /// Install is blocked.
        PackageInstallBlocked = "package-install-blocked",
        /// Package is corrupt.
        PackageCorrupt = "package-corrupt",
        /// Every package is already installed.
        AllPackagesAlreadyInstalled = "all-packages-already-installed",
        /// File not found.
        FileNotFound = "file-not-found",
        /// No more mirrors to try.
        NoMoreMirrorsToTry = "no-more-mirrors-to-try",
        /// No distribution upgrade data.
        NoDistroUpgradeData = "no-distro-upgrade-data",
        /// Incompatible architecture.
        IncompatibleArchitecture = "incompatible-architecture",
        /// No space left on device.
        NoSpaceOnDevice = "no-space-on-device",
        /// Media change required.
        MediaChangeRequired = "media-change-required",
        /// Not authorized.
        NotAuthorized = "not-authorized",
        /// Update not found.
        UpdateNotFound = "update-not-found",
        /// Sources cannot be fetched.
        CannotFetchSources = "cannot-fetch-sources",
    }
}

text_enum! {
    /// Kind of an informational message.
    pub enum MessageKind("message") {
        /// Not known.
        Unknown = "unknown",
        /// A mirror is broken.
        BrokenMirror = "broken-mirror",
        /// Connection refused.
        ConnectionRefused = "connection-refused",
        /// A parameter is invalid.
        ParameterInvalid = "parameter-invalid",
        /// A priority is invalid.
        PriorityInvalid = "priority-invalid",
        /// Developer-facing backend problem.
        BackendError = "backend-error",
        /// Developer-facing daemon problem.
        DaemonError = "daemon-error",
        /// The cache is being rebuilt.
        CacheBeingRebuilt = "cache-being-rebuilt",
        /// An untrusted package was used.
        UntrustedPackage = "untrusted-package",
        /// A newer package exists.
        NewerPackageExists = "newer-package-exists",
        /// A package could not be found.
        CouldNotFindPackage = "could-not-find-package",
        /// Configuration files changed.
        ConfigFilesChanged = "config-files-changed",
        /// Package already installed.
        PackageAlreadyInstalled = "package-already-installed",
        /// Autoremove was ignored.
        AutoremoveIgnored = "autoremove-ignored",
        /// Repository metadata download failed.
        RepoMetadataDownloadFailed = "repo-metadata-download-failed",
        /// Repository is for developers only.
        RepoForDevelopersOnly = "repo-for-developers-only",
        /// Some updates were held back.
        OtherUpdatesHeldBack = "other-updates-held-back",
    }
}

impl MessageKind {
    /// Messages meant for developers rather than end users.
    pub fn is_developer_only(self) -> bool {
        matches!(self, MessageKind::BackendError | MessageKind::DaemonError)
    }
}

text_enum! {
    /// Restart required after a transaction.
    pub enum Restart("restart") {
        /// Not known.
        Unknown = "unknown",
        /// No restart.
        None = "none",
        /// Restart the application.
        Application = "application",
        /// Log out and back in.
        Session = "session",
        /// Reboot.
        System = "system",
        /// Log out for a security update.
        SecuritySession = "security-session",
        /// Reboot for a security update.
        SecuritySystem = "security-system",
    }
}

impl Restart {
    /// Severity used to keep the most demanding restart of a transaction.
    pub fn severity(self) -> u8 {
        match self {
            Restart::Unknown => 0,
            Restart::None => 1,
            Restart::Application => 2,
            Restart::Session => 3,
            Restart::SecuritySession => 4,
            Restart::System => 5,
            Restart::SecuritySystem => 6,
        }
    }
}

text_enum! {
    /// Package group.
    pub enum Group("group") {
        /// Not known.
        Unknown = "unknown",
        /// Accessibility.
        Accessibility = "accessibility",
        /// Accessories.
        Accessories = "accessories",
        /// Administration tools.
        AdminTools = "admin-tools",
        /// Communication.
        Communication = "communication",
        /// GNOME desktop.
        DesktopGnome = "desktop-gnome",
        /// KDE desktop.
        DesktopKde = "desktop-kde",
        /// Other desktops.
        DesktopOther = "desktop-other",
        /// XFCE desktop.
        DesktopXfce = "desktop-xfce",
        /// Education.
        Education = "education",
        /// Fonts.
        Fonts = "fonts",
        /// Games.
        Games = "games",
        /// Graphics.
        Graphics = "graphics",
        /// Internet.
        Internet = "internet",
        /// Legacy.
        Legacy = "legacy",
        /// Localization.
        Localization = "localization",
        /// Maps.
        Maps = "maps",
        /// Multimedia.
        Multimedia = "multimedia",
        /// Network.
        Network = "network",
        /// Office.
        Office = "office",
        /// Other.
        Other = "other",
        /// Power management.
        PowerManagement = "power-management",
        /// Programming.
        Programming = "programming",
        /// Publishing.
        Publishing = "publishing",
        /// Repositories.
        Repos = "repos",
        /// Security.
        Security = "security",
        /// Servers.
        Servers = "servers",
        /// System.
        System = "system",
        /// Virtualization.
        Virtualization = "virtualization",
        /// Science.
        Science = "science",
        /// Documentation.
        Documentation = "documentation",
        /// Electronics.
        Electronics = "electronics",
        /// Collections.
        Collections = "collections",
        /// Vendor.
        Vendor = "vendor",
        /// Newest packages.
        Newest = "newest",
    }
}

text_enum! {
    /// Kind of a distribution upgrade.
    pub enum DistroUpgradeKind("distro upgrade") {
        /// Not known.
        Unknown = "unknown",
        /// Stable release.
        Stable = "stable",
        /// Development release.
        Unstable = "unstable",
    }
}

text_enum! {
    /// Signature type of a repository key.
    pub enum SigType("signature type") {
        /// Not known.
        Unknown = "unknown",
        /// GPG key.
        Gpg = "gpg",
    }
}

text_enum! {
    /// Capability kind searched by `WhatProvides`.
    pub enum Provides("provides") {
        /// Not known.
        Unknown = "unknown",
        /// Any capability.
        Any = "any",
        /// Kernel module alias.
        Modalias = "modalias",
        /// Multimedia codec.
        Codec = "codec",
        /// Mime type handler.
        Mimetype = "mimetype",
        /// Font.
        Font = "font",
        /// Hardware driver.
        Hardware = "hardware",
        /// Printer driver.
        PostscriptDriver = "postscript-driver",
        /// Language support.
        LanguageSupport = "language-support",
    }
}

text_enum! {
    /// Release state of an update.
    pub enum UpdateState("update state") {
        /// Not known.
        Unknown = "unknown",
        /// Stable.
        Stable = "stable",
        /// Unstable.
        Unstable = "unstable",
        /// Testing.
        Testing = "testing",
    }
}

text_enum! {
    /// Network connectivity as seen by the daemon.
    pub enum NetworkState("network state") {
        /// Not known.
        Unknown = "unknown",
        /// No connection.
        Offline = "offline",
        /// Connected, type unknown.
        Online = "online",
        /// Wired connection.
        Wired = "wired",
        /// Wireless connection.
        Wifi = "wifi",
        /// Mobile broadband.
        Mobile = "mobile",
    }
}

impl NetworkState {
    /// Returns true for any connected state.
    pub fn is_online(self) -> bool {
        matches!(
            self,
            NetworkState::Online | NetworkState::Wired | NetworkState::Wifi | NetworkState::Mobile
        )
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        NetworkState::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_text_round_trip() {
        for role in Role::ALL {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, *role);
        }
        assert!("frobnicate".parse::<Role>().is_err());
    }

    #[test]
    fn bitfield_enums_fit_in_u64() {
        assert!(Role::ALL.len() <= 64);
        assert!(Group::ALL.len() <= 64);
    }

    #[test]
    fn info_progress_and_status() {
        assert!(Info::Installing.is_in_progress());
        assert!(!Info::Installed.is_in_progress());
        assert_eq!(Info::Downloading.implied_status(), Some(Status::Download));
        assert_eq!(Info::Available.implied_status(), None);
    }

    #[test]
    fn restart_severity_orders_security_last() {
        assert!(Restart::SecuritySystem.severity() > Restart::System.severity());
        assert!(Restart::Session.severity() > Restart::Application.severity());
    }

    #[test]
    fn network_online_states() {
        assert!(NetworkState::Wifi.is_online());
        assert!(!NetworkState::Offline.is_online());
        assert!(!NetworkState::Unknown.is_online());
    }

    #[test]
    fn enums_serialize_as_text() {
        let json = serde_json::to_string(&Exit::KeyRequired).unwrap();
        assert_eq!(json, "\"key-required\"");
        let back: Exit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Exit::KeyRequired);
    }

    #[test]
    fn role_classification() {
        assert!(Role::UpdateSystem.is_single_instance());
        assert!(Role::GetCategories.is_single_instance());
        assert!(!Role::InstallPackages.is_single_instance());
        assert!(Role::InstallPackages.is_recorded());
        assert!(!Role::Resolve.requires_authorization());
        assert!(Role::RepoEnable.changes_repo_list());
    }
}
