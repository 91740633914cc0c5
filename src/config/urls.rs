//! Upstream URLs

/// Base URL for plain PKGBUILD downloads from the AUR.
///
/// The package name is appended as the `h` (head) query value.
pub const AUR_PKGBUILD_BASE: &str = "https://aur.archlinux.org/cgit/aur.git/plain/PKGBUILD?h=";

/// Default recipe URL for an AUR package
pub fn aur_pkgbuild_url(package: &str) -> String {
    format!("{AUR_PKGBUILD_BASE}{package}")
}
