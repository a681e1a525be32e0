//! Region/page planning.
//!
//! Expands the configured page ranges into one [`FetchTask`] per
//! `(region, page)` pair. Planning is pure: the same configuration always
//! produces the same task list, in the same order.

use ladder_models::Region;
use serde::Deserialize;

use crate::router::ProviderRouter;

/// Page range to fetch for one region.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionPages {
    /// Leaderboard region.
    pub region: Region,
    /// First page, 1-based.
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Last page, inclusive.
    pub last_page: u32,
}

const fn default_first_page() -> u32 {
    1
}

/// One page to fetch through one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    /// Leaderboard region.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Provider id assigned to the current attempt.
    pub provider: String,
    /// 0-based attempt number.
    pub attempt: u32,
}

/// Inputs to [`plan_tasks`].
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions<'a> {
    /// Page ranges, in fetch order.
    pub regions: &'a [RegionPages],
    /// Whether the aggregate region is fetched at all.
    pub include_global: bool,
    /// Optional allow-list; regions outside it are skipped.
    pub allow_list: Option<&'a [Region]>,
}

impl PlanOptions<'_> {
    /// Whether `region` makes it into the plan.
    #[must_use]
    pub fn admits(&self, region: Region) -> bool {
        if region.is_aggregate() && !self.include_global {
            return false;
        }
        self.allow_list.is_none_or(|allowed| allowed.contains(&region))
    }
}

/// Expands `options` into fetch tasks, each on attempt 0 with its
/// first-attempt provider assigned by `router`.
#[must_use]
pub fn plan_tasks(options: &PlanOptions<'_>, router: &ProviderRouter) -> Vec<FetchTask> {
    let mut tasks = Vec::new();

    for pages in options.regions {
        if !options.admits(pages.region) {
            log::debug!("Skipping region {} (not admitted)", pages.region);
            continue;
        }
        if pages.last_page < pages.first_page || pages.first_page == 0 {
            log::warn!(
                "Region {}: empty page range {}..={}",
                pages.region,
                pages.first_page,
                pages.last_page
            );
            continue;
        }
        for page in pages.first_page..=pages.last_page {
            tasks.push(FetchTask {
                region: pages.region,
                page,
                provider: router.assign(pages.region, page).to_string(),
                attempt: 0,
            });
        }
    }

    tasks
}

/// Groups planned tasks by region, keeping first-appearance order.
#[must_use]
pub fn group_by_region(tasks: Vec<FetchTask>) -> Vec<(Region, Vec<FetchTask>)> {
    let mut groups: Vec<(Region, Vec<FetchTask>)> = Vec::new();
    for task in tasks {
        if let Some((_, group)) = groups.iter_mut().find(|(r, _)| *r == task.region) {
            group.push(task);
        } else {
            groups.push((task.region, vec![task]));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderPool, ProviderSlot};
    use crate::registry::all_providers;

    fn router() -> ProviderRouter {
        let slots = all_providers()
            .into_iter()
            .map(|def| ProviderSlot::new(def, 1, vec!["k".to_string()]))
            .collect();
        ProviderRouter::new(&ProviderPool::new(slots)).unwrap()
    }

    fn pages(region: Region, first_page: u32, last_page: u32) -> RegionPages {
        RegionPages {
            region,
            first_page,
            last_page,
        }
    }

    #[test]
    fn one_task_per_region_page_in_order() {
        let regions = [pages(Region::Eu, 1, 3), pages(Region::Nac, 2, 3)];
        let options = PlanOptions {
            regions: &regions,
            include_global: true,
            allow_list: None,
        };
        let tasks = plan_tasks(&options, &router());
        let ids: Vec<(Region, u32)> = tasks.iter().map(|t| (t.region, t.page)).collect();
        assert_eq!(
            ids,
            vec![
                (Region::Eu, 1),
                (Region::Eu, 2),
                (Region::Eu, 3),
                (Region::Nac, 2),
                (Region::Nac, 3),
            ]
        );
        assert!(tasks.iter().all(|t| t.attempt == 0 && !t.provider.is_empty()));
    }

    #[test]
    fn global_requires_inclusion_flag() {
        let regions = [pages(Region::Eu, 1, 1), pages(Region::Global, 1, 2)];
        let mut options = PlanOptions {
            regions: &regions,
            include_global: false,
            allow_list: None,
        };
        assert_eq!(plan_tasks(&options, &router()).len(), 1);
        options.include_global = true;
        assert_eq!(plan_tasks(&options, &router()).len(), 3);
    }

    #[test]
    fn allow_list_filters_regions() {
        let regions = [pages(Region::Eu, 1, 2), pages(Region::Br, 1, 2)];
        let allowed = [Region::Br];
        let options = PlanOptions {
            regions: &regions,
            include_global: true,
            allow_list: Some(&allowed),
        };
        let tasks = plan_tasks(&options, &router());
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.region == Region::Br));
    }

    #[test]
    fn inverted_range_yields_nothing() {
        let regions = [pages(Region::Eu, 5, 4), pages(Region::Oce, 0, 2)];
        let options = PlanOptions {
            regions: &regions,
            include_global: true,
            allow_list: None,
        };
        assert!(plan_tasks(&options, &router()).is_empty());
    }

    #[test]
    fn planning_is_deterministic() {
        let regions = [pages(Region::Eu, 1, 20), pages(Region::Asia, 1, 20)];
        let options = PlanOptions {
            regions: &regions,
            include_global: true,
            allow_list: None,
        };
        assert_eq!(plan_tasks(&options, &router()), plan_tasks(&options, &router()));
    }

    #[test]
    fn groups_keep_region_order() {
        let regions = [pages(Region::Me, 1, 2), pages(Region::Eu, 1, 1)];
        let options = PlanOptions {
            regions: &regions,
            include_global: true,
            allow_list: None,
        };
        let groups = group_by_region(plan_tasks(&options, &router()));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, Region::Me);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, Region::Eu);
    }
}
