//! Ahead/behind counts between a local branch and a remote-tracking branch

use git2::{Oid, Repository, Sort};

use crate::models::Divergence;

/// Count commits the local branch is ahead of and behind `<remote>/<branch>`.
///
/// Missing references mean the divergence is unknown, which is reported as `(0, 0)`.
pub fn compute_divergence(repo: &Repository, remote: &str, branch: &str) -> Divergence {
    let Some(local) = local_tip(repo, branch) else {
        tracing::debug!("No local tip for branch {}", branch);
        return Divergence::default();
    };
    let Some(upstream) = remote_tip(repo, remote, branch) else {
        tracing::debug!("No remote-tracking tip for {}/{}", remote, branch);
        return Divergence::default();
    };

    match (count_hidden(repo, local, upstream), count_hidden(repo, upstream, local)) {
        (Ok(ahead), Ok(behind)) => Divergence { ahead, behind },
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("Failed to walk history for {}/{}: {}", remote, branch, e);
            Divergence::default()
        }
    }
}

/// `refs/heads/<branch>`, falling back to HEAD
fn local_tip(repo: &Repository, branch: &str) -> Option<Oid> {
    let reference = repo
        .find_reference(&format!("refs/heads/{}", branch))
        .or_else(|_| repo.head())
        .ok()?;
    let commit = reference.peel_to_commit().ok()?;
    Some(commit.id())
}

/// `refs/remotes/<remote>/<branch>`, falling back to `refs/remotes/<remote>/HEAD`
fn remote_tip(repo: &Repository, remote: &str, branch: &str) -> Option<Oid> {
    let reference = repo
        .find_reference(&format!("refs/remotes/{}/{}", remote, branch))
        .or_else(|_| repo.find_reference(&format!("refs/remotes/{}/HEAD", remote)))
        .ok()?;
    let commit = reference.resolve().ok()?.peel_to_commit().ok()?;
    Some(commit.id())
}

/// Number of commits reachable from `from` but not from `hidden`
fn count_hidden(repo: &Repository, from: Oid, hidden: Oid) -> Result<usize, git2::Error> {
    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL)?;
    walk.push(from)?;
    walk.hide(hidden)?;

    let mut count = 0;
    for oid in walk {
        oid?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestRepo;

    #[test]
    fn test_missing_remote_refs_report_zero() {
        let repo = TestRepo::with_initial_commit();
        let branch = repo.current_branch();
        let divergence = compute_divergence(&repo.repo(), "origin", &branch);
        assert_eq!(divergence, Divergence::default());
    }

    #[test]
    fn test_counts_in_both_directions() {
        let repo = TestRepo::with_initial_commit();
        let branch = repo.current_branch();
        let base = repo.head_oid();

        repo.create_commit("Local one", &[("a.txt", "a")]);
        repo.create_commit("Local two", &[("b.txt", "b")]);
        let local_head = repo.head_oid();

        // Build a diverging remote line from the shared base
        repo.set_head_to(base);
        repo.create_commit("Remote one", &[("c.txt", "c")]);
        let remote_head = repo.head_oid();
        repo.set_head_to(local_head);

        let git_repo = repo.repo();
        git_repo
            .reference(
                &format!("refs/remotes/origin/{}", branch),
                remote_head,
                true,
                "test",
            )
            .unwrap();

        let divergence = compute_divergence(&git_repo, "origin", &branch);
        assert_eq!(divergence, Divergence { ahead: 2, behind: 1 });
    }

    #[test]
    fn test_falls_back_to_remote_head() {
        let repo = TestRepo::with_initial_commit();
        let base = repo.head_oid();
        repo.create_commit("Local", &[("a.txt", "a")]);

        let git_repo = repo.repo();
        git_repo
            .reference("refs/remotes/origin/trunk", base, true, "test")
            .unwrap();
        git_repo
            .reference_symbolic(
                "refs/remotes/origin/HEAD",
                "refs/remotes/origin/trunk",
                true,
                "test",
            )
            .unwrap();

        // No refs/remotes/origin/<branch> exists for this branch name
        let divergence = compute_divergence(&git_repo, "origin", "no-such-branch");
        assert_eq!(divergence, Divergence { ahead: 1, behind: 0 });
    }

    #[test]
    fn test_up_to_date_is_zero() {
        let repo = TestRepo::with_initial_commit();
        let branch = repo.current_branch();
        let git_repo = repo.repo();
        git_repo
            .reference(
                &format!("refs/remotes/origin/{}", branch),
                repo.head_oid(),
                true,
                "test",
            )
            .unwrap();

        assert_eq!(
            compute_divergence(&git_repo, "origin", &branch),
            Divergence::default()
        );
        assert_eq!(
            compute_divergence(&git_repo, "origin", &branch),
            Divergence::default()
        );
    }
}
