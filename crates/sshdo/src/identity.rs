//! OS user/group lookups, kept out of `sshdo-policy` so that crate stays
//! free of platform glue (its `IdentityResolver` trait is the seam).

use nix::unistd::{Gid, Group, User};
use sshdo_policy::IdentityResolver;

pub struct OsIdentityResolver;

impl IdentityResolver for OsIdentityResolver {
    fn user_exists(&self, name: &str) -> bool {
        matches!(User::from_name(name), Ok(Some(_)))
    }

    fn group_exists(&self, name: &str) -> bool {
        matches!(Group::from_name(name), Ok(Some(_)))
    }
}

/// The primary group name followed by supplementary group names, in the
/// order reported by the OS (§4.3: "order as reported by the OS"; §9:
/// "primary group first, then supplementary groups as returned by the OS
/// enumerator"). Returns an empty list for an unknown user.
pub fn groups_for_user(username: &str) -> Vec<String> {
    let Ok(Some(user)) = User::from_name(username) else {
        return Vec::new();
    };

    let mut seen_gids = Vec::new();
    let mut names = Vec::new();

    if let Ok(Some(primary)) = Group::from_gid(user.gid) {
        seen_gids.push(primary.gid);
        names.push(primary.name);
    }

    for gid in supplementary_gids(username, user.gid) {
        if seen_gids.contains(&gid) {
            continue;
        }
        if let Ok(Some(group)) = Group::from_gid(gid) {
            seen_gids.push(gid);
            names.push(group.name);
        }
    }

    names
}

/// Calls libc's `getgrouplist` directly: nix has no safe wrapper for it,
/// and it's the only portable way to enumerate a user's supplementary
/// groups without re-reading `/etc/group` by hand.
fn supplementary_gids(username: &str, primary_gid: Gid) -> Vec<Gid> {
    use std::ffi::CString;

    let Ok(cname) = CString::new(username) else {
        return Vec::new();
    };

    let base_gid = primary_gid.as_raw();

    let mut ngroups: libc::c_int = 32;
    loop {
        let mut buf: Vec<libc::gid_t> = vec![0; ngroups as usize];
        let mut count = ngroups;
        // SAFETY: `cname` is a valid, nul-terminated C string; `buf` has
        // `count` elements and `getgrouplist` writes at most that many.
        let rc = unsafe {
            libc::getgrouplist(
                cname.as_ptr(),
                base_gid as libc::gid_t,
                buf.as_mut_ptr(),
                &mut count,
            )
        };

        if rc >= 0 {
            buf.truncate(count as usize);
            return buf
                .into_iter()
                .map(nix::unistd::Gid::from_raw)
                .collect();
        }

        if count <= ngroups {
            return Vec::new();
        }
        ngroups = count;
    }
}
