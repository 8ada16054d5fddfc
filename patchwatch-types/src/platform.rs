use std::fmt;

/// A Linux distribution release the pipeline can serve advisories for.
///
/// The set is closed: it covers exactly the namespaces the upstream database
/// publishes. Each platform has two serial forms — the agent-facing external
/// name (`debian-8`) and the upstream namespace (`debian:8`) — produced by
/// [`external_name`](Self::external_name) and
/// [`upstream_name`](Self::upstream_name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    CentOs5,
    CentOs6,
    CentOs7,
    Debian8,
    Debian9,
    Debian10,
    DebianUnstable,
    Alpine3_3,
    Alpine3_4,
    Alpine3_5,
    Alpine3_6,
    Alpine3_7,
    Alpine3_8,
    Oracle5,
    Oracle6,
    Oracle7,
    Ubuntu12_04,
    Ubuntu12_10,
    Ubuntu13_04,
    Ubuntu13_10,
    Ubuntu14_04,
    Ubuntu14_10,
    Ubuntu15_04,
    Ubuntu15_10,
    Ubuntu16_04,
    Ubuntu16_10,
    Ubuntu17_04,
    Ubuntu17_10,
    Ubuntu18_04,
}

impl Platform {
    pub const ALL: [Platform; 29] = [
        Self::CentOs5,
        Self::CentOs6,
        Self::CentOs7,
        Self::Debian8,
        Self::Debian9,
        Self::Debian10,
        Self::DebianUnstable,
        Self::Alpine3_3,
        Self::Alpine3_4,
        Self::Alpine3_5,
        Self::Alpine3_6,
        Self::Alpine3_7,
        Self::Alpine3_8,
        Self::Oracle5,
        Self::Oracle6,
        Self::Oracle7,
        Self::Ubuntu12_04,
        Self::Ubuntu12_10,
        Self::Ubuntu13_04,
        Self::Ubuntu13_10,
        Self::Ubuntu14_04,
        Self::Ubuntu14_10,
        Self::Ubuntu15_04,
        Self::Ubuntu15_10,
        Self::Ubuntu16_04,
        Self::Ubuntu16_10,
        Self::Ubuntu17_04,
        Self::Ubuntu17_10,
        Self::Ubuntu18_04,
    ];

    /// The `(distro, version)` pair behind both serial forms.
    fn parts(self) -> (&'static str, &'static str) {
        match self {
            Self::CentOs5 => ("centos", "5"),
            Self::CentOs6 => ("centos", "6"),
            Self::CentOs7 => ("centos", "7"),
            Self::Debian8 => ("debian", "8"),
            Self::Debian9 => ("debian", "9"),
            Self::Debian10 => ("debian", "10"),
            Self::DebianUnstable => ("debian", "unstable"),
            Self::Alpine3_3 => ("alpine", "3.3"),
            Self::Alpine3_4 => ("alpine", "3.4"),
            Self::Alpine3_5 => ("alpine", "3.5"),
            Self::Alpine3_6 => ("alpine", "3.6"),
            Self::Alpine3_7 => ("alpine", "3.7"),
            Self::Alpine3_8 => ("alpine", "3.8"),
            Self::Oracle5 => ("oracle", "5"),
            Self::Oracle6 => ("oracle", "6"),
            Self::Oracle7 => ("oracle", "7"),
            Self::Ubuntu12_04 => ("ubuntu", "12.04"),
            Self::Ubuntu12_10 => ("ubuntu", "12.10"),
            Self::Ubuntu13_04 => ("ubuntu", "13.04"),
            Self::Ubuntu13_10 => ("ubuntu", "13.10"),
            Self::Ubuntu14_04 => ("ubuntu", "14.04"),
            Self::Ubuntu14_10 => ("ubuntu", "14.10"),
            Self::Ubuntu15_04 => ("ubuntu", "15.04"),
            Self::Ubuntu15_10 => ("ubuntu", "15.10"),
            Self::Ubuntu16_04 => ("ubuntu", "16.04"),
            Self::Ubuntu16_10 => ("ubuntu", "16.10"),
            Self::Ubuntu17_04 => ("ubuntu", "17.04"),
            Self::Ubuntu17_10 => ("ubuntu", "17.10"),
            Self::Ubuntu18_04 => ("ubuntu", "18.04"),
        }
    }

    /// Agent-facing name, e.g. `debian-8`.
    pub fn external_name(self) -> String {
        let (distro, version) = self.parts();
        format!("{distro}-{version}")
    }

    /// Upstream namespace, e.g. `debian:8`. Alpine versions carry a `v`
    /// prefix upstream (`alpine:v3.8`).
    pub fn upstream_name(self) -> String {
        let (distro, version) = self.parts();
        if distro == "alpine" {
            format!("{distro}:v{version}")
        } else {
            format!("{distro}:{version}")
        }
    }

    /// Parse an external name. Names outside the closed set are rejected.
    pub fn from_external_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.external_name() == name)
    }

    /// External names of every supported platform, for usage listings.
    pub fn supported_names() -> Vec<String> {
        Self::ALL.iter().map(|p| p.external_name()).collect()
    }

    pub fn is_debian_like(self) -> bool {
        matches!(self.parts().0, "debian" | "ubuntu")
    }

    pub fn is_rpm_based(self) -> bool {
        matches!(self.parts().0, "centos" | "oracle")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.external_name())
    }
}
